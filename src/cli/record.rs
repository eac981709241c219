//! Record commands
//!
//! Reads go through a stale-while-revalidate accessor, so a failed refresh
//! still prints what the cache held. Writes go through the operation runner,
//! which marks the collection updated.

use colored::Colorize;
use serde_json::{Value, json};

use crate::cache::CacheMode;
use crate::cli::{CommandContext, GlobalOptions, ListArgs, OutputFormat};
use crate::client::{ApiResponse, Record, RecordApi, RecordPage};
use crate::error::{ApiError, Error, Result};
use crate::output;
use crate::reactive::{DataState, FetchOptions, OperationOptions, ReactiveData, StateCell, fetcher};

fn cache_mode(options: FetchOptions) -> CacheMode {
    if options.skip_cache {
        CacheMode::Bypass
    } else {
        CacheMode::Use
    }
}

/// List records of a collection
pub async fn list(
    opts: &GlobalOptions,
    collection: &str,
    args: &ListArgs,
    refresh: bool,
) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let params = args.to_params();

    let fetch = {
        let client = ctx.client.clone();
        let collection = collection.to_string();
        let params = params.clone();
        fetcher(move |options| {
            let client = client.clone();
            let collection = collection.clone();
            let params = params.clone();
            async move {
                let resp = client
                    .list_with(&collection, &params, cache_mode(options))
                    .await?;
                to_value_response(resp)
            }
        })
    };

    let records = ReactiveData::<RecordPage>::builder(ctx.store().clone(), collection, "list", fetch)
        .params(params.to_value())
        .build();

    if refresh || !ctx.cache_enabled {
        records.refresh_data(true).await;
    } else {
        records.load_data().await;
    }

    let (page, from_cache) = settle(records.state())?;
    output::print_records(&page.items, ctx.format, from_cache)?;
    if ctx.format == OutputFormat::Table && page.total_pages > 1 {
        println!(
            "{}",
            format!(
                "Page {} of {} ({} records)",
                page.page, page.total_pages, page.total_items
            )
            .dimmed()
        );
    }
    Ok(())
}

/// Show one record
pub async fn get(opts: &GlobalOptions, collection: &str, id: &str, refresh: bool) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    let fetch = {
        let client = ctx.client.clone();
        let collection = collection.to_string();
        let id = id.to_string();
        fetcher(move |options| {
            let client = client.clone();
            let collection = collection.clone();
            let id = id.clone();
            async move { client.get_with(&collection, &id, cache_mode(options)).await }
        })
    };

    let record = ReactiveData::<Record>::builder(ctx.store().clone(), collection, "get", fetch)
        .id(id)
        .build();

    if refresh || !ctx.cache_enabled {
        record.refresh_data(true).await;
    } else {
        record.load_data().await;
    }

    let (data, from_cache) = settle(record.state())?;
    output::print_value(&data, ctx.format, from_cache)
}

/// Create a record
pub async fn create(opts: &GlobalOptions, collection: &str, data: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let body = parse_body(data)?;
    let (options, error, message) = mutation_options(collection);

    let created = ctx
        .operations
        .perform_create("record", ctx.client.create(collection, &body), options)
        .await
        .ok_or_else(|| failure(&error))?;

    announce(&message, ctx.format);
    output::print_value(&created.data, ctx.format, false)
}

/// Patch a record
pub async fn update(opts: &GlobalOptions, collection: &str, id: &str, data: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let body = parse_body(data)?;
    let (options, error, message) = mutation_options(collection);

    let updated = ctx
        .operations
        .perform_update("record", ctx.client.update(collection, id, &body), options)
        .await
        .ok_or_else(|| failure(&error))?;

    announce(&message, ctx.format);
    output::print_value(&updated.data, ctx.format, false)
}

/// Delete a record
pub async fn delete(opts: &GlobalOptions, collection: &str, id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let (options, error, message) = mutation_options(collection);

    ctx.operations
        .perform_delete("record", ctx.client.delete(collection, id), options)
        .await
        .ok_or_else(|| failure(&error))?;

    match ctx.format {
        OutputFormat::Json => {
            output::print_value(&json!({ "collection": collection, "deleted": id }), ctx.format, false)
        }
        OutputFormat::Table => {
            announce(&message, ctx.format);
            Ok(())
        }
    }
}

fn to_value_response(resp: ApiResponse<RecordPage>) -> Result<ApiResponse<Value>> {
    Ok(ApiResponse {
        data: serde_json::to_value(resp.data)?,
        from_cache: resp.from_cache,
    })
}

/// Final accessor state as (data, from_cache); stale data wins over an error.
fn settle<T>(state: DataState<T>) -> Result<(T, bool)> {
    match (state.data, state.error) {
        (Some(data), None) => Ok((data, state.from_cache)),
        (Some(data), Some(err)) => {
            eprintln!("{} Showing cached data, refresh failed: {}", "⚠".yellow(), err);
            Ok((data, true))
        }
        (None, Some(err)) => Err(Error::Other(err)),
        (None, None) => Err(ApiError::InvalidResponse("no data returned".to_string()).into()),
    }
}

type Cells = (OperationOptions, StateCell<Option<String>>, StateCell<Option<String>>);

fn mutation_options(collection: &str) -> Cells {
    let error = StateCell::new(None);
    let message = StateCell::new(None);
    let options = OperationOptions::new()
        .error(&error)
        .message(&message)
        .collection(collection);
    (options, error, message)
}

fn failure(error: &StateCell<Option<String>>) -> Error {
    Error::Other(error.get().unwrap_or_else(|| "request failed".to_string()))
}

fn announce(message: &StateCell<Option<String>>, format: OutputFormat) {
    if format == OutputFormat::Table
        && let Some(text) = message.get()
    {
        println!("{} {}", "✓".green(), text);
    }
}

fn parse_body(data: &str) -> Result<Value> {
    let body: Value = serde_json::from_str(data)?;
    if !body.is_object() {
        return Err(ApiError::BadRequest("--data must be a JSON object".to_string()).into());
    }
    Ok(body)
}

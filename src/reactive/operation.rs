//! Operation wrapper
//!
//! Runs one network call inside a uniform envelope: error cleared, call
//! awaited, loading flag off. The loading flag only goes on if the call
//! suspends, so an answer the cache layer short-circuits never flickers it.
//! A successful call that names a collection bumps that collection's
//! timestamp, which is how a mutation becomes visible to every open accessor.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::Poll;

use chrono::Utc;

use super::cell::StateCell;
use crate::cache::store::{CacheStore, UpdateOrigin};
use crate::client::ApiResponse;
use crate::error::{Error, Result};

/// Cells and invalidation target for one operation.
#[derive(Clone, Default)]
pub struct OperationOptions {
    loading: Option<StateCell<bool>>,
    error: Option<StateCell<Option<String>>>,
    message: Option<StateCell<Option<String>>>,
    collection: Option<String>,
    origin: Option<UpdateOrigin>,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loading(mut self, cell: &StateCell<bool>) -> Self {
        self.loading = Some(cell.clone());
        self
    }

    pub fn error(mut self, cell: &StateCell<Option<String>>) -> Self {
        self.error = Some(cell.clone());
        self
    }

    /// Receives the success message of create/update/delete.
    pub fn message(mut self, cell: &StateCell<Option<String>>) -> Self {
        self.message = Some(cell.clone());
        self
    }

    /// Collection to mark updated on success.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// How the timestamp bump is labelled (defaults to a mutation).
    pub fn origin(mut self, origin: UpdateOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

type SuccessHook<T, R> = Box<dyn FnOnce(ApiResponse<T>) -> R + Send>;
type ErrorHook<R> = Box<dyn FnOnce(&Error) -> Option<R> + Send>;

/// Result-shaping callbacks for [`Operations::perform_with`].
pub struct Hooks<T, R> {
    on_success: SuccessHook<T, R>,
    on_error: Option<ErrorHook<R>>,
}

impl<T, R> Hooks<T, R> {
    pub fn on_success(f: impl FnOnce(ApiResponse<T>) -> R + Send + 'static) -> Self {
        Self {
            on_success: Box::new(f),
            on_error: None,
        }
    }

    /// Called after the error cell is set; its value becomes the result.
    pub fn on_error(mut self, f: impl FnOnce(&Error) -> Option<R> + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Runs operations against a shared cache store.
#[derive(Clone)]
pub struct Operations {
    store: Arc<CacheStore>,
}

impl Operations {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Run `operation`; failures resolve to `None` with the error cell set.
    pub async fn perform<T, F>(
        &self,
        operation: F,
        options: OperationOptions,
    ) -> Option<ApiResponse<T>>
    where
        T: 'static,
        F: Future<Output = Result<ApiResponse<T>>>,
    {
        self.perform_with(operation, options, Hooks::on_success(|resp| resp))
            .await
    }

    /// Run `operation`, shaping the result through `hooks`.
    pub async fn perform_with<T, R, F>(
        &self,
        operation: F,
        options: OperationOptions,
        hooks: Hooks<T, R>,
    ) -> Option<R>
    where
        T: 'static,
        F: Future<Output = Result<ApiResponse<T>>>,
    {
        if let Some(ref error) = options.error {
            error.set(None);
        }

        let mut operation = pin!(operation);
        let result = match futures::poll!(operation.as_mut()) {
            Poll::Ready(result) => result,
            Poll::Pending => {
                if let Some(ref loading) = options.loading {
                    loading.set(true);
                }
                operation.await
            }
        };

        let outcome = match result {
            Ok(response) => {
                if let Some(ref collection) = options.collection {
                    let origin = options.origin.unwrap_or(UpdateOrigin::Mutation);
                    let ts = self.store.record_update(
                        collection,
                        Utc::now().timestamp_millis(),
                        origin,
                    );
                    log::debug!("Marked {} updated at {}", collection, ts);
                }
                Some((hooks.on_success)(response))
            }
            Err(e) => {
                log::debug!("Operation failed: {}", e);
                if let Some(ref error) = options.error {
                    error.set(Some(e.to_string()));
                }
                hooks.on_error.and_then(|on_error| on_error(&e))
            }
        };

        if let Some(ref loading) = options.loading
            && loading.get()
        {
            loading.set(false);
        }
        outcome
    }

    /// Create wrapper; sets "<Entity> created successfully".
    pub async fn perform_create<T, F>(
        &self,
        entity: &str,
        operation: F,
        options: OperationOptions,
    ) -> Option<ApiResponse<T>>
    where
        T: 'static,
        F: Future<Output = Result<ApiResponse<T>>>,
    {
        self.perform_with_message(entity, "created", operation, options)
            .await
    }

    /// Update wrapper; sets "<Entity> updated successfully".
    pub async fn perform_update<T, F>(
        &self,
        entity: &str,
        operation: F,
        options: OperationOptions,
    ) -> Option<ApiResponse<T>>
    where
        T: 'static,
        F: Future<Output = Result<ApiResponse<T>>>,
    {
        self.perform_with_message(entity, "updated", operation, options)
            .await
    }

    /// Delete wrapper; sets "<Entity> deleted successfully".
    pub async fn perform_delete<T, F>(
        &self,
        entity: &str,
        operation: F,
        options: OperationOptions,
    ) -> Option<ApiResponse<T>>
    where
        T: 'static,
        F: Future<Output = Result<ApiResponse<T>>>,
    {
        self.perform_with_message(entity, "deleted", operation, options)
            .await
    }

    async fn perform_with_message<T, F>(
        &self,
        entity: &str,
        verb: &str,
        operation: F,
        options: OperationOptions,
    ) -> Option<ApiResponse<T>>
    where
        T: 'static,
        F: Future<Output = Result<ApiResponse<T>>>,
    {
        let message_cell = options.message.clone();
        if let Some(ref cell) = message_cell {
            cell.set(None);
        }

        let response = self.perform(operation, options).await;

        if response.is_some()
            && let Some(cell) = message_cell
        {
            cell.set(Some(success_message(entity, verb)));
        }
        response
    }
}

/// "edge" + "created" -> "Edge created successfully"
pub fn success_message(entity: &str, verb: &str) -> String {
    let entity = entity.trim();
    let mut chars = entity.chars();
    let subject = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => "Record".to_string(),
    };
    format!("{} {} successfully", subject, verb)
}

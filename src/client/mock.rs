//! Mock record API for testing
//!
//! Holds collections in memory, counts calls, can be told to fail the
//! next call, and can hold reads until released.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify};

use super::{ApiResponse, ListParams, Record, RecordApi, RecordPage};
use crate::error::{ApiError, Result};

/// Tracks API call counts for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub list: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.list + self.get + self.create + self.update + self.delete
    }
}

/// In-memory [`RecordApi`].
#[derive(Default)]
pub struct MockRecordApi {
    collections: Arc<Mutex<HashMap<String, Vec<Record>>>>,
    error: Arc<Mutex<Option<ApiError>>>,
    call_count: Arc<Mutex<CallCounts>>,
    next_id: Arc<Mutex<u64>>,
    read_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl MockRecordApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with records.
    pub fn with_records(self, collection: &str, records: Vec<Record>) -> Self {
        if let Ok(mut collections) = self.collections.try_lock() {
            collections.insert(collection.to_string(), records);
        }
        self
    }

    /// Fail the next call with `error`.
    pub async fn fail_next(&self, error: ApiError) {
        *self.error.lock().await = Some(error);
    }

    /// Park every `list`/`get` until `gate` is notified.
    pub async fn hold_reads(&self, gate: Arc<Notify>) {
        *self.read_gate.lock().await = Some(gate);
    }

    async fn wait_for_gate(&self) {
        let gate = self.read_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    pub async fn call_counts(&self) -> CallCounts {
        self.call_count.lock().await.clone()
    }

    async fn take_error(&self) -> Result<()> {
        match self.error.lock().await.take() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl RecordApi for MockRecordApi {
    async fn list(
        &self,
        collection: &str,
        params: &ListParams,
    ) -> Result<ApiResponse<RecordPage>> {
        self.call_count.lock().await.list += 1;
        self.wait_for_gate().await;
        self.take_error().await?;

        let collections = self.collections.lock().await;
        let mut items = collections.get(collection).cloned().unwrap_or_default();
        if let Some(ref sort) = params.sort {
            let field = sort.trim_start_matches('-');
            items.sort_by(|a, b| {
                let a = a.get(field).map(Value::to_string).unwrap_or_default();
                let b = b.get(field).map(Value::to_string).unwrap_or_default();
                a.cmp(&b)
            });
            if sort.starts_with('-') {
                items.reverse();
            }
        }

        let per_page = params.per_page.unwrap_or(30);
        Ok(ApiResponse::fresh(RecordPage {
            page: params.page.unwrap_or(1),
            per_page,
            total_items: items.len() as i64,
            total_pages: 1,
            items,
        }))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<ApiResponse<Record>> {
        self.call_count.lock().await.get += 1;
        self.wait_for_gate().await;
        self.take_error().await?;

        let collections = self.collections.lock().await;
        collections
            .get(collection)
            .and_then(|items| items.iter().find(|r| record_id(r) == Some(id)))
            .cloned()
            .map(ApiResponse::fresh)
            .ok_or_else(|| ApiError::NotFound(format!("{}/{}", collection, id)).into())
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<ApiResponse<Record>> {
        self.call_count.lock().await.create += 1;
        self.take_error().await?;

        let id = {
            let mut next = self.next_id.lock().await;
            *next += 1;
            format!("rec{}", *next)
        };
        let mut record = body.clone();
        if let Some(obj) = record.as_object_mut() {
            obj.insert("id".into(), json!(id));
        }

        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(ApiResponse::fresh(record))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Value,
    ) -> Result<ApiResponse<Record>> {
        self.call_count.lock().await.update += 1;
        self.take_error().await?;

        let mut collections = self.collections.lock().await;
        let record = collections
            .get_mut(collection)
            .and_then(|items| items.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| ApiError::NotFound(format!("{}/{}", collection, id)))?;

        if let (Some(target), Some(patch)) = (record.as_object_mut(), body.as_object()) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(ApiResponse::fresh(record.clone()))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<ApiResponse<()>> {
        self.call_count.lock().await.delete += 1;
        self.take_error().await?;

        let mut collections = self.collections.lock().await;
        let items = collections.entry(collection.to_string()).or_default();
        let before = items.len();
        items.retain(|r| record_id(r) != Some(id));
        if items.len() == before {
            return Err(ApiError::NotFound(format!("{}/{}", collection, id)).into());
        }
        Ok(ApiResponse::fresh(()))
    }
}

//! PocketBase record API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[cfg(test)]
pub mod mock;
pub mod pocketbase;

#[cfg(test)]
pub use mock::MockRecordApi;
pub use pocketbase::PocketBaseClient;

/// A PocketBase record; shape depends on the collection schema.
pub type Record = Value;

/// Response envelope shared by every API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// The payload
    pub data: T,

    /// Set when the response was served from a local cache, not the network
    #[serde(default)]
    pub from_cache: bool,
}

impl<T> ApiResponse<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            from_cache: false,
        }
    }

    pub fn cached(data: T) -> Self {
        Self {
            data,
            from_cache: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: f(self.data),
            from_cache: self.from_cache,
        }
    }
}

/// Query parameters for listing records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,
}

impl ListParams {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Params as a JSON object for cache keys; `None` when nothing is set.
    pub fn to_value(&self) -> Option<Value> {
        if self.is_empty() {
            None
        } else {
            serde_json::to_value(self).ok()
        }
    }

    /// Params as HTTP query pairs
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![];
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            query.push(("perPage", per_page.to_string()));
        }
        if let Some(ref sort) = self.sort {
            query.push(("sort", sort.clone()));
        }
        if let Some(ref filter) = self.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(ref expand) = self.expand {
            query.push(("expand", expand.clone()));
        }
        query
    }
}

/// One page of records as returned by PocketBase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<Record>,
}

/// Record CRUD over PocketBase collections
#[async_trait]
pub trait RecordApi: Send + Sync {
    /// List records of a collection
    async fn list(&self, collection: &str, params: &ListParams)
    -> Result<ApiResponse<RecordPage>>;

    /// Fetch a single record
    async fn get(&self, collection: &str, id: &str) -> Result<ApiResponse<Record>>;

    /// Create a record
    async fn create(&self, collection: &str, body: &Value) -> Result<ApiResponse<Record>>;

    /// Patch a record
    async fn update(&self, collection: &str, id: &str, body: &Value)
    -> Result<ApiResponse<Record>>;

    /// Delete a record
    async fn delete(&self, collection: &str, id: &str) -> Result<ApiResponse<()>>;
}

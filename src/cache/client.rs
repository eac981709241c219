//! Cached wrapper for the record API
//!
//! Reads are answered from the persistent cache when a fresh entry exists
//! (the response then carries `from_cache = true`). Writes go straight to the
//! inner client and drop the affected collection's cached entries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::key::KeyParts;
use super::store::CacheStore;
use crate::client::{ApiResponse, ListParams, Record, RecordApi, RecordPage};
use crate::error::Result;

/// Whether a read may be answered from cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve fresh cached entries
    Use,
    /// Always go to the network, then refresh the cache
    Bypass,
}

/// Cached wrapper for any RecordApi implementation.
///
/// Cache can be disabled via the `enabled` flag (for `--no-cache`).
pub struct CachedRecordApi<C: RecordApi> {
    inner: Arc<C>,
    store: Arc<CacheStore>,
    ttl: Duration,
    enabled: bool,
}

impl<C: RecordApi> CachedRecordApi<C> {
    /// Create a new cached client wrapper.
    ///
    /// # Arguments
    /// * `inner` - The underlying API client to wrap
    /// * `store` - Shared cache context
    /// * `ttl` - How long a cached read stays servable
    /// * `enabled` - Whether caching is enabled (false for --no-cache)
    pub fn new(inner: C, store: Arc<CacheStore>, ttl: Duration, enabled: bool) -> Self {
        Self {
            inner: Arc::new(inner),
            store,
            ttl,
            enabled,
        }
    }

    /// Get the inner client
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Try to get cached data
    fn get_cached<T: DeserializeOwned>(&self, key: &str, mode: CacheMode) -> Option<T> {
        if !self.enabled || mode == CacheMode::Bypass {
            return None;
        }
        self.store.persistent().get_fresh(key, self.ttl)
    }

    /// Store data in cache, unless the store was reset since `epoch`.
    ///
    /// A read in flight across a reset was keyed for the previous tenant.
    fn set_cached<T: Serialize>(&self, key: &str, data: &T, epoch: u64) {
        if !self.enabled {
            return;
        }
        if self.store.epoch() != epoch {
            log::debug!("Store reset during read, not caching {}", key);
            return;
        }
        self.store.persistent().set(key, data);
    }

    /// Drop cached reads of a collection after a write
    fn invalidate(&self, collection: &str) {
        if self.enabled {
            let removed = self.store.clear_collection_data(collection);
            log::debug!("Invalidated {} cached reads of {}", removed, collection);
        }
    }

    /// List records, choosing whether the cache may answer.
    pub async fn list_with(
        &self,
        collection: &str,
        params: &ListParams,
        mode: CacheMode,
    ) -> Result<ApiResponse<RecordPage>> {
        let params_value = params.to_value();
        let key = self
            .store
            .keys()
            .generate(KeyParts::new(collection, "list").params(params_value.as_ref()));

        if let Some(cached) = self.get_cached(&key, mode) {
            log::debug!("Cache hit: list {}", collection);
            return Ok(ApiResponse::cached(cached));
        }

        let epoch = self.store.epoch();
        let result = self.inner.list(collection, params).await?;
        self.set_cached(&key, &result.data, epoch);
        Ok(result)
    }

    /// Fetch one record, choosing whether the cache may answer.
    pub async fn get_with(
        &self,
        collection: &str,
        id: &str,
        mode: CacheMode,
    ) -> Result<ApiResponse<Record>> {
        let key = self
            .store
            .keys()
            .generate(KeyParts::new(collection, "get").id(Some(id)));

        if let Some(cached) = self.get_cached(&key, mode) {
            log::debug!("Cache hit: get {}/{}", collection, id);
            return Ok(ApiResponse::cached(cached));
        }

        let epoch = self.store.epoch();
        let result = self.inner.get(collection, id).await?;
        self.set_cached(&key, &result.data, epoch);
        Ok(result)
    }
}

#[async_trait]
impl<C: RecordApi + 'static> RecordApi for CachedRecordApi<C> {
    async fn list(
        &self,
        collection: &str,
        params: &ListParams,
    ) -> Result<ApiResponse<RecordPage>> {
        self.list_with(collection, params, CacheMode::Use).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<ApiResponse<Record>> {
        self.get_with(collection, id, CacheMode::Use).await
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<ApiResponse<Record>> {
        let result = self.inner.create(collection, body).await?;
        self.invalidate(collection);
        Ok(result)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Value,
    ) -> Result<ApiResponse<Record>> {
        let result = self.inner.update(collection, id, body).await?;
        self.invalidate(collection);
        Ok(result)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<ApiResponse<()>> {
        let result = self.inner.delete(collection, id).await?;
        self.invalidate(collection);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::key::{KeyGenerator, SessionScope, TenantScope};
    use crate::cache::persistent::PersistentCache;
    use crate::client::MockRecordApi;
    use serde_json::json;

    fn create_shared_client(enabled: bool) -> (Arc<CachedRecordApi<MockRecordApi>>, SessionScope) {
        let (client, scope) = create_test_client(enabled);
        (Arc::new(client), scope)
    }

    fn create_test_client(enabled: bool) -> (CachedRecordApi<MockRecordApi>, SessionScope) {
        let scope = SessionScope::new(Some(TenantScope::new("u1", "o1")));
        let persistent = PersistentCache::with_prefix(Arc::new(MemoryBackend::new()), "t");
        let keys = KeyGenerator::new("t", Some(Arc::new(scope.clone())));
        let store = Arc::new(CacheStore::new(persistent, keys));

        let mock = MockRecordApi::new().with_records(
            "edges",
            vec![json!({"id": "e1", "name": "b"}), json!({"id": "e2", "name": "a"})],
        );
        let client = CachedRecordApi::new(mock, store, Duration::from_secs(60), enabled);
        (client, scope)
    }

    #[tokio::test]
    async fn test_list_cached_across_param_order() {
        let (client, _) = create_test_client(true);

        let first = ListParams {
            sort: Some("name".into()),
            per_page: Some(10),
            ..Default::default()
        };
        let resp1 = client.list("edges", &first).await.unwrap();
        assert!(!resp1.from_cache);

        // Built independently, fields assigned in a different order
        let mut second = ListParams::default();
        second.per_page = Some(10);
        second.sort = Some("name".into());
        let resp2 = client.list("edges", &second).await.unwrap();

        assert!(resp2.from_cache);
        assert_eq!(resp1.data, resp2.data);
        assert_eq!(client.inner().call_counts().await.list, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_bypasses_cache() {
        let (client, _) = create_test_client(false);

        let _ = client.list("edges", &ListParams::default()).await;
        let resp = client.list("edges", &ListParams::default()).await.unwrap();

        assert!(!resp.from_cache);
        assert_eq!(client.inner().call_counts().await.list, 2);
    }

    #[tokio::test]
    async fn test_bypass_mode_refetches_and_refreshes() {
        let (client, _) = create_test_client(true);
        let params = ListParams::default();

        client.list("edges", &params).await.unwrap();
        let fresh = client
            .list_with("edges", &params, CacheMode::Bypass)
            .await
            .unwrap();
        assert!(!fresh.from_cache);

        let cached = client.list("edges", &params).await.unwrap();
        assert!(cached.from_cache);
        assert_eq!(client.inner().call_counts().await.list, 2);
    }

    #[tokio::test]
    async fn test_get_cached() {
        let (client, _) = create_test_client(true);

        client.get("edges", "e1").await.unwrap();
        let resp = client.get("edges", "e1").await.unwrap();

        assert!(resp.from_cache);
        assert_eq!(resp.data["id"], "e1");
        assert_eq!(client.inner().call_counts().await.get, 1);
    }

    #[tokio::test]
    async fn test_mutation_invalidates_collection() {
        let (client, _) = create_test_client(true);
        let params = ListParams::default();

        client.list("edges", &params).await.unwrap();
        client
            .create("edges", &json!({"name": "c"}))
            .await
            .unwrap();

        let resp = client.list("edges", &params).await.unwrap();
        assert!(!resp.from_cache);
        assert_eq!(resp.data.items.len(), 3);
        assert_eq!(client.inner().call_counts().await.list, 2);
    }

    #[tokio::test]
    async fn test_tenant_switch_misses() {
        let (client, scope) = create_test_client(true);
        let params = ListParams::default();

        client.list("edges", &params).await.unwrap();
        scope.set(Some(TenantScope::new("u2", "o9")));
        let resp = client.list("edges", &params).await.unwrap();

        assert!(!resp.from_cache);
        assert_eq!(client.inner().call_counts().await.list, 2);
    }

    #[tokio::test]
    async fn test_failed_read_is_not_cached() {
        let (client, _) = create_test_client(true);
        client
            .inner()
            .fail_next(crate::error::ApiError::Network("down".into()))
            .await;

        assert!(client.get("edges", "e1").await.is_err());
        let resp = client.get("edges", "e1").await.unwrap();
        assert!(!resp.from_cache);
    }

    #[tokio::test]
    async fn test_read_in_flight_across_reset_is_not_cached() {
        let (client, scope) = create_shared_client(true);
        let gate = Arc::new(tokio::sync::Notify::new());
        client.inner().hold_reads(gate.clone()).await;

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.list("edges", &ListParams::default()).await })
        };
        while client.inner().call_counts().await.list == 0 {
            tokio::task::yield_now().await;
        }

        // Logout while the read is parked
        client.store().reset_all();
        scope.set(None);
        gate.notify_one();

        let resp = pending.await.unwrap().unwrap();
        assert!(!resp.from_cache);
        assert_eq!(client.store().persistent().stats().total_entries, 0);

        // Same user signs back in: nothing from before the reset survives
        scope.set(Some(TenantScope::new("u1", "o1")));
        gate.notify_one();
        let again = client.list("edges", &ListParams::default()).await.unwrap();
        assert!(!again.from_cache);
        assert_eq!(client.inner().call_counts().await.list, 2);
    }
}

//! Stale-while-revalidate data accessor
//!
//! A `ReactiveData` gives one consumer a `{data, loading, error}` view of a
//! (collection, operation, id, params) read. Cached data is published
//! immediately, a fetch always follows, and the fresh result replaces it.
//!
//! Every load or refresh takes a new generation number; a response whose
//! generation has been superseded is dropped without publishing. One that
//! started before a store reset is dropped too, and the local state with it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::cell::StateCell;
use crate::cache::key::KeyParts;
use crate::cache::store::{CacheStore, StoreEvent, UpdateOrigin};
use crate::client::ApiResponse;
use crate::error::{Error, Result};

/// Options handed to the fetch function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// The caller asked to bypass every cache layer.
    pub skip_cache: bool,
}

/// Network read backing an accessor.
pub type FetchFn =
    Arc<dyn Fn(FetchOptions) -> BoxFuture<'static, Result<ApiResponse<Value>>> + Send + Sync>;

/// Projection from the raw payload to the consumer's type.
pub type ProcessFn<T> = Arc<dyn Fn(Value) -> Result<T> + Send + Sync>;

/// Wrap an async closure as a [`FetchFn`].
pub fn fetcher<F, Fut>(f: F) -> FetchFn
where
    F: Fn(FetchOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiResponse<Value>>> + Send + 'static,
{
    Arc::new(move |options| Box::pin(f(options)))
}

/// What a consumer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DataState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    /// The published data came from a cache rather than the network.
    pub from_cache: bool,
    /// Incremented on every data publish.
    pub revision: u64,
    /// Latest collection timestamp this accessor has seen.
    pub last_updated: Option<i64>,
}

impl<T> Default for DataState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            from_cache: false,
            revision: 0,
            last_updated: None,
        }
    }
}

/// Builder for [`ReactiveData`].
pub struct ReactiveDataBuilder<T> {
    store: Arc<CacheStore>,
    collection: String,
    operation: String,
    id: Option<String>,
    params: Option<Value>,
    fetch: FetchFn,
    process: Option<ProcessFn<T>>,
    revalidate_on_mutation: bool,
}

impl<T> ReactiveDataBuilder<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Record-level read.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Query params; part of the cache key.
    pub fn params(mut self, params: Option<Value>) -> Self {
        self.params = params.filter(|p| !p.is_null());
        self
    }

    /// Project the raw payload before publishing.
    pub fn process<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<T> + Send + Sync + 'static,
    {
        self.process = Some(Arc::new(f));
        self
    }

    /// Re-fetch when a mutation bumps this collection (default on).
    pub fn revalidate_on_mutation(mut self, enabled: bool) -> Self {
        self.revalidate_on_mutation = enabled;
        self
    }

    pub fn build(self) -> Arc<ReactiveData<T>> {
        let process = self
            .process
            .unwrap_or_else(|| Arc::new(|raw| serde_json::from_value(raw).map_err(Error::from)));

        let epoch = self.store.epoch();
        Arc::new(ReactiveData {
            store: self.store,
            collection: self.collection,
            operation: self.operation,
            id: self.id,
            params: self.params,
            fetch: self.fetch,
            process,
            state: StateCell::new(DataState::default()),
            generation: AtomicU64::new(0),
            seen_epoch: AtomicU64::new(epoch),
            loaded: AtomicBool::new(false),
            initial_pending: AtomicBool::new(false),
            revalidate_on_mutation: self.revalidate_on_mutation,
            watcher: Mutex::new(None),
        })
    }
}

/// Per-consumer stale-while-revalidate view of one cached read.
pub struct ReactiveData<T> {
    store: Arc<CacheStore>,
    collection: String,
    operation: String,
    id: Option<String>,
    params: Option<Value>,
    fetch: FetchFn,
    process: ProcessFn<T>,
    state: StateCell<DataState<T>>,
    generation: AtomicU64,
    /// Store epoch the published state belongs to
    seen_epoch: AtomicU64,
    loaded: AtomicBool,
    initial_pending: AtomicBool,
    revalidate_on_mutation: bool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T> ReactiveData<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn builder(
        store: Arc<CacheStore>,
        collection: impl Into<String>,
        operation: impl Into<String>,
        fetch: FetchFn,
    ) -> ReactiveDataBuilder<T> {
        ReactiveDataBuilder {
            store,
            collection: collection.into(),
            operation: operation.into(),
            id: None,
            params: None,
            fetch,
            process: None,
            revalidate_on_mutation: true,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn key_parts(&self) -> KeyParts<'_> {
        KeyParts::new(&self.collection, &self.operation)
            .id(self.id.as_deref())
            .params(self.params.as_ref())
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> DataState<T> {
        self.state.get()
    }

    pub fn data(&self) -> Option<T> {
        self.state.with(|s| s.data.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.state.with(|s| s.loading)
    }

    pub fn error(&self) -> Option<String> {
        self.state.with(|s| s.error.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<DataState<T>> {
        self.state.subscribe()
    }

    /// Whether an initial load has completed.
    pub fn has_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// The collection timestamp as the store sees it right now.
    pub fn last_updated(&self) -> Option<i64> {
        self.store.timestamp(&self.collection)
    }

    /// Whether the collection changed since this accessor last saw it.
    pub fn is_stale(&self) -> bool {
        let seen = self.state.with(|s| s.last_updated);
        self.store.is_stale(&self.collection, seen)
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn read_cached(&self) -> Option<T> {
        let raw = self.store.get_entry(self.key_parts())?;
        match (self.process)(raw) {
            Ok(data) => Some(data),
            Err(e) => {
                log::debug!("Ignoring unreadable cache entry for {}: {}", self.collection, e);
                None
            }
        }
    }

    /// Publish cached data if any, then fetch fresh data.
    pub async fn load_data(&self) {
        let generation = self.begin();

        match self.read_cached() {
            Some(stale) => {
                log::debug!("Serving cached {} while revalidating", self.collection);
                self.state.update(|s| {
                    s.data = Some(stale);
                    s.loading = false;
                    s.from_cache = true;
                    s.revision += 1;
                });
            }
            None => self.state.update(|s| s.loading = true),
        }

        self.revalidate(generation, FetchOptions::default()).await;
    }

    /// Fetch again; with `skip_cache` the cached read is skipped too.
    pub async fn refresh_data(&self, skip_cache: bool) {
        if !skip_cache {
            return self.load_data().await;
        }

        let generation = self.begin();
        self.state.update(|s| s.loading = true);
        self.revalidate(generation, FetchOptions { skip_cache: true })
            .await;
    }

    async fn revalidate(&self, generation: u64, options: FetchOptions) {
        let epoch = self.store.epoch();

        self.store.start_refresh();
        let result = (self.fetch)(options).await;
        self.store.end_refresh();

        if !self.is_current(generation) {
            log::debug!("Dropping superseded response for {}", self.collection);
            return;
        }
        if self.store.epoch() != epoch {
            log::debug!(
                "Dropping response for {} fetched before a cache reset",
                self.collection
            );
            // Whatever was published before the reset belongs to the old scope
            self.clear_local();
            return;
        }

        let outcome = result.and_then(|resp| {
            let data = (self.process)(resp.data.clone())?;
            Ok((resp, data))
        });

        match outcome {
            Ok((resp, data)) => {
                // Re-storing a cache hit would restart its TTL
                if !resp.from_cache {
                    self.store.store_entry(self.key_parts(), &resp.data);
                }
                let timestamp = self.store.record_update(
                    &self.collection,
                    Utc::now().timestamp_millis(),
                    UpdateOrigin::Fetch,
                );
                self.loaded.store(true, Ordering::SeqCst);
                self.seen_epoch.store(epoch, Ordering::SeqCst);
                self.state.update(|s| {
                    s.data = Some(data);
                    s.loading = false;
                    s.error = None;
                    s.from_cache = resp.from_cache;
                    s.revision += 1;
                    s.last_updated = Some(timestamp);
                });
            }
            Err(e) => {
                log::warn!("Failed to fetch {}: {}", self.collection, e);
                // Stale data, if any, stays visible
                self.state.update(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    /// Push a value without a network round-trip.
    pub fn update_data(&self, new_data: T) {
        self.begin();

        // Persist only values the projection can read back
        match serde_json::to_value(&new_data) {
            Ok(raw) if (self.process)(raw.clone()).is_ok() => {
                self.store.store_entry(self.key_parts(), &raw)
            }
            _ => self.store.remove_entry(self.key_parts()),
        }

        let timestamp = self.store.record_update(
            &self.collection,
            Utc::now().timestamp_millis(),
            UpdateOrigin::Manual,
        );
        self.loaded.store(true, Ordering::SeqCst);
        self.seen_epoch.store(self.store.epoch(), Ordering::SeqCst);
        self.state.update(|s| {
            s.data = Some(new_data);
            s.loading = false;
            s.error = None;
            s.from_cache = false;
            s.revision += 1;
            s.last_updated = Some(timestamp);
        });
    }

    fn clear_local(&self) {
        self.begin();
        self.seen_epoch.store(self.store.epoch(), Ordering::SeqCst);
        self.loaded.store(false, Ordering::SeqCst);
        self.state.update(|s| {
            s.data = None;
            s.loading = false;
            s.error = None;
            s.from_cache = false;
            s.last_updated = None;
        });
    }

    /// After missed events, drop local state if a reset went by unseen.
    fn resync(&self) {
        if self.seen_epoch.load(Ordering::SeqCst) != self.store.epoch() {
            log::debug!("{} missed a cache reset, clearing", self.collection);
            self.clear_local();
        }
    }

    fn spawn_initial_load(self: &Arc<Self>) {
        if self.has_loaded() || self.initial_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.load_data().await;
            this.initial_pending.store(false, Ordering::SeqCst);
        });
    }

    fn on_timestamp(self: &Arc<Self>, timestamp: i64, origin: UpdateOrigin) {
        self.state.update(|s| {
            s.last_updated = Some(s.last_updated.map_or(timestamp, |seen| seen.max(timestamp)));
        });

        if origin == UpdateOrigin::Mutation && self.revalidate_on_mutation && self.has_loaded() {
            log::debug!("Revalidating {} after mutation", self.collection);
            let this = Arc::clone(self);
            tokio::spawn(async move { this.refresh_data(true).await });
        }
    }

    /// Subscribe to the store: load when navigated to, follow timestamps,
    /// revalidate after mutations, and drop data on reset.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(self: &Arc<Self>) {
        let mut nav = self.store.watch_current_collection();
        let mut events = self.store.subscribe();
        let weak = Arc::downgrade(self);
        let collection = self.collection.clone();

        let handle = tokio::spawn(async move {
            let on_screen = nav.borrow_and_update().as_deref() == Some(collection.as_str());
            if on_screen && let Some(this) = weak.upgrade() {
                this.spawn_initial_load();
            }

            loop {
                tokio::select! {
                    changed = nav.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let on_screen =
                            nav.borrow_and_update().as_deref() == Some(collection.as_str());
                        if !on_screen {
                            continue;
                        }
                        let Some(this) = weak.upgrade() else { break };
                        this.spawn_initial_load();
                    }
                    event = events.recv() => {
                        let Some(this) = weak.upgrade() else { break };
                        match event {
                            Ok(StoreEvent::TimestampUpdated { collection: c, timestamp, origin })
                                if c == collection =>
                            {
                                this.on_timestamp(timestamp, origin);
                            }
                            Ok(StoreEvent::Reset) => this.clear_local(),
                            Ok(StoreEvent::Shutdown) | Err(RecvError::Closed) => break,
                            Ok(_) => {}
                            Err(RecvError::Lagged(skipped)) => {
                                log::debug!("{} watcher lagged by {} events", collection, skipped);
                                this.resync();
                            }
                        }
                    }
                }
            }
        });

        if let Ok(mut watcher) = self.watcher.lock()
            && let Some(previous) = watcher.replace(handle)
        {
            previous.abort();
        }
    }

    /// Stop following the store.
    pub fn dispose(&self) {
        if let Ok(mut watcher) = self.watcher.lock()
            && let Some(handle) = watcher.take()
        {
            handle.abort();
        }
    }
}

impl<T> Drop for ReactiveData<T> {
    fn drop(&mut self) {
        if let Ok(mut watcher) = self.watcher.lock()
            && let Some(handle) = watcher.take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::key::{KeyGenerator, SessionScope, TenantScope};
    use crate::cache::persistent::PersistentCache;
    use crate::error::ApiError;
    use crate::reactive::operation::{OperationOptions, Operations};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn test_store() -> (Arc<CacheStore>, SessionScope) {
        let scope = SessionScope::new(Some(TenantScope::new("u1", "o1")));
        let persistent = PersistentCache::with_prefix(Arc::new(MemoryBackend::new()), "t");
        let keys = KeyGenerator::new("t", Some(Arc::new(scope.clone())));
        (Arc::new(CacheStore::new(persistent, keys)), scope)
    }

    /// Fetcher returning `value` and counting calls.
    fn counting(value: Value) -> (FetchFn, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = fetcher(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move { Ok::<_, Error>(ApiResponse::fresh(value)) }
        });
        (fetch, calls)
    }

    /// Fetcher that waits for `gate` before returning `value`.
    fn gated(value: Value, gate: Arc<Notify>) -> FetchFn {
        fetcher(move |_| {
            let value = value.clone();
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok::<_, Error>(ApiResponse::fresh(value))
            }
        })
    }

    fn failing() -> FetchFn {
        fetcher(|_| async { Err(Error::from(ApiError::Network("offline".into()))) })
    }

    async fn wait_for_state<T: Clone>(
        data: &ReactiveData<T>,
        f: impl FnMut(&DataState<T>) -> bool,
    ) where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let mut rx = data.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(f))
            .await
            .expect("state never reached")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn test_stale_then_fresh_publishes_twice() {
        let (store, _) = test_store();
        store.store_entry(KeyParts::new("things", "list"), &json!(["stale"]));
        let gate = Arc::new(Notify::new());

        let data = ReactiveData::<Vec<String>>::builder(
            store.clone(),
            "things",
            "list",
            gated(json!(["fresh"]), gate.clone()),
        )
        .build();

        let task = tokio::spawn({
            let data = data.clone();
            async move { data.load_data().await }
        });

        wait_for_state(&data, |s| s.revision >= 1).await;
        let state = data.state();
        assert_eq!(state.data, Some(vec!["stale".to_string()]));
        assert!(!state.loading);
        assert!(state.from_cache);
        assert_eq!(state.revision, 1);

        gate.notify_one();
        task.await.unwrap();

        let state = data.state();
        assert_eq!(state.data, Some(vec!["fresh".to_string()]));
        assert!(!state.from_cache);
        assert_eq!(state.revision, 2);
        assert!(data.has_loaded());
        assert_eq!(
            store.get_entry(KeyParts::new("things", "list")),
            Some(json!(["fresh"]))
        );
        assert!(store.timestamp("things").is_some());
    }

    #[tokio::test]
    async fn test_no_cache_stays_loading_until_fetch() {
        let (store, _) = test_store();
        let gate = Arc::new(Notify::new());
        let data = ReactiveData::<Vec<i32>>::builder(
            store,
            "edges",
            "list",
            gated(json!([1, 2]), gate.clone()),
        )
        .build();

        let task = tokio::spawn({
            let data = data.clone();
            async move { data.load_data().await }
        });

        wait_for_state(&data, |s| s.loading).await;
        assert_eq!(data.data(), None);

        gate.notify_one();
        task.await.unwrap();

        assert!(!data.is_loading());
        assert_eq!(data.data(), Some(vec![1, 2]));
        assert_eq!(data.state().revision, 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_data() {
        let (store, _) = test_store();
        store.store_entry(KeyParts::new("things", "list"), &json!(["stale"]));

        let data =
            ReactiveData::<Vec<String>>::builder(store, "things", "list", failing()).build();
        data.load_data().await;

        let state = data.state();
        assert_eq!(state.data, Some(vec!["stale".to_string()]));
        assert!(state.error.unwrap().contains("offline"));
        assert!(!state.loading);
        assert!(!data.has_loaded());
    }

    #[tokio::test]
    async fn test_failure_without_cache_surfaces_error() {
        let (store, _) = test_store();
        let data =
            ReactiveData::<Vec<String>>::builder(store.clone(), "things", "list", failing())
                .build();
        data.load_data().await;

        let state = data.state();
        assert_eq!(state.data, None);
        assert!(state.error.is_some());
        assert!(!state.loading);
        assert_eq!(store.timestamp("things"), None);
    }

    #[tokio::test]
    async fn test_process_projects_payload() {
        let (store, _) = test_store();
        let (fetch, _) = counting(json!({"items": [{"id": "a"}, {"id": "b"}]}));

        let data = ReactiveData::<Vec<String>>::builder(store, "things", "list", fetch)
            .process(|raw| {
                let ids = raw["items"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| i["id"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(ids)
            })
            .build();
        data.load_data().await;

        assert_eq!(data.data(), Some(vec!["a".to_string(), "b".to_string()]));

        // The projection also applies to the cached raw payload
        let (fetch, _) = counting(json!({"items": []}));
        let raw_view =
            ReactiveData::<Value>::builder(data.store.clone(), "things", "list", fetch).build();
        assert_eq!(
            raw_view.read_cached(),
            Some(json!({"items": [{"id": "a"}, {"id": "b"}]}))
        );
    }

    #[tokio::test]
    async fn test_refresh_skip_cache_does_not_publish_stale() {
        let (store, _) = test_store();
        store.store_entry(KeyParts::new("things", "list"), &json!([0]));
        let (fetch, calls) = counting(json!([1]));
        let data = ReactiveData::<Vec<i32>>::builder(store, "things", "list", fetch).build();

        data.refresh_data(true).await;

        assert_eq!(data.state().revision, 1);
        assert_eq!(data.data(), Some(vec![1]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        data.refresh_data(false).await;
        // Cached [1] then fetched [1]
        assert_eq!(data.state().revision, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_superseded_response_is_dropped() {
        let (store, _) = test_store();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let gate = gate.clone();
            let calls = calls.clone();
            fetcher(move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let gate = gate.clone();
                async move {
                    if n == 0 {
                        gate.notified().await;
                        Ok::<_, Error>(ApiResponse::fresh(json!("old")))
                    } else {
                        Ok(ApiResponse::fresh(json!("new")))
                    }
                }
            })
        };
        let data = ReactiveData::<String>::builder(store, "things", "get", fetch)
            .id("a")
            .build();

        let slow = tokio::spawn({
            let data = data.clone();
            async move { data.load_data().await }
        });
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        data.refresh_data(true).await;
        assert_eq!(data.data(), Some("new".to_string()));

        gate.notify_one();
        slow.await.unwrap();
        assert_eq!(data.data(), Some("new".to_string()));
        assert_eq!(data.state().revision, 1);
    }

    #[tokio::test]
    async fn test_update_data_publishes_and_stores() {
        let (store, _) = test_store();
        let (fetch, calls) = counting(json!([]));
        let data =
            ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch).build();

        data.update_data(vec![7]);

        assert_eq!(data.data(), Some(vec![7]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.get_entry(KeyParts::new("things", "list")),
            Some(json!([7]))
        );
        assert!(store.timestamp("things").is_some());
    }

    #[tokio::test]
    async fn test_navigation_triggers_initial_load_once() {
        let (store, _) = test_store();
        let (fetch, calls) = counting(json!(["x"]));
        let data =
            ReactiveData::<Vec<String>>::builder(store.clone(), "things", "list", fetch).build();
        data.watch();

        store.set_current_collection(Some("edges"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.set_current_collection(Some("things"));
        wait_for_state(&data, |s| s.revision >= 1 && !s.loading).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.set_current_collection(Some("edges"));
        store.set_current_collection(Some("things"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutation_propagates_to_every_accessor() {
        let (store, _) = test_store();
        let (fetch_a, calls_a) = counting(json!([1]));
        let (fetch_b, calls_b) = counting(json!([1]));
        let a = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch_a).build();
        let b = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "get", fetch_b)
            .id("x")
            .build();
        a.watch();
        b.watch();
        a.load_data().await;
        b.load_data().await;

        let before = store.timestamp("things");

        // A third call site creates a thing through the operation runner
        tokio::time::sleep(Duration::from_millis(5)).await;
        let created = Operations::new(store.clone())
            .perform_create(
                "thing",
                async { Ok::<_, Error>(ApiResponse::fresh(json!({"id": "t9"}))) },
                OperationOptions::new().collection("things"),
            )
            .await;
        assert!(created.is_some());
        let mutated = store.timestamp("things").unwrap();
        assert!(Some(mutated) >= before);

        wait_for_state(&a, |s| s.last_updated >= Some(mutated)).await;
        wait_for_state(&b, |s| s.last_updated >= Some(mutated)).await;
        assert!(a.last_updated() >= Some(mutated));
        assert!(b.last_updated() >= Some(mutated));

        // Both re-fetched once; their own fetches did not trigger more
        wait_for_state(&a, |s| s.revision >= 2).await;
        wait_for_state(&b, |s| s.revision >= 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls_a.load(Ordering::SeqCst), 2);
        assert_eq!(calls_b.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_revalidate_on_mutation_can_be_disabled() {
        let (store, _) = test_store();
        let (fetch, calls) = counting(json!([1]));
        let data = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch)
            .revalidate_on_mutation(false)
            .build();
        data.watch();
        data.load_data().await;

        let ts = store.record_update("things", i64::MAX - 1, UpdateOrigin::Mutation);
        wait_for_state(&data, |s| s.last_updated == Some(ts)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!data.is_stale());
    }

    #[tokio::test]
    async fn test_is_stale_without_watch() {
        let (store, _) = test_store();
        let (fetch, _) = counting(json!([1]));
        let data = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch).build();
        data.load_data().await;
        assert!(!data.is_stale());

        store.record_update("things", i64::MAX - 1, UpdateOrigin::Mutation);
        assert!(data.is_stale());
        assert_eq!(data.last_updated(), Some(i64::MAX - 1));
    }

    #[tokio::test]
    async fn test_reset_clears_accessor() {
        let (store, _) = test_store();
        let (fetch, _) = counting(json!([1]));
        let data = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch).build();
        data.watch();
        data.load_data().await;

        store.reset_all();

        wait_for_state(&data, |s| s.data.is_none()).await;
        assert!(!data.has_loaded());
        assert_eq!(store.get_entry(KeyParts::new("things", "list")), None);
    }

    #[tokio::test]
    async fn test_response_from_previous_tenant_is_dropped() {
        let (store, scope) = test_store();
        let gate = Arc::new(Notify::new());
        let data = ReactiveData::<Vec<String>>::builder(
            store.clone(),
            "things",
            "list",
            gated(json!(["u1-data"]), gate.clone()),
        )
        .build();

        let task = tokio::spawn({
            let data = data.clone();
            async move { data.load_data().await }
        });
        wait_for_state(&data, |s| s.loading).await;

        store.reset_all();
        scope.set(Some(TenantScope::new("u2", "o2")));
        gate.notify_one();
        task.await.unwrap();

        assert_eq!(data.data(), None);
        assert!(!data.is_loading());
        assert_eq!(data.error(), None);
        assert!(!data.has_loaded());
        assert_eq!(store.get_entry(KeyParts::new("things", "list")), None);
        assert_eq!(store.timestamp("things"), None);
    }

    #[tokio::test]
    async fn test_stale_data_from_previous_tenant_is_cleared_on_dropped_response() {
        let (store, _) = test_store();
        store.store_entry(KeyParts::new("things", "list"), &json!(["u1-stale"]));
        let gate = Arc::new(Notify::new());
        let data = ReactiveData::<Vec<String>>::builder(
            store.clone(),
            "things",
            "list",
            gated(json!(["u1-fresh"]), gate.clone()),
        )
        .build();

        let task = tokio::spawn({
            let data = data.clone();
            async move { data.load_data().await }
        });
        wait_for_state(&data, |s| s.data.is_some()).await;

        // Not watched, so only the dropped response can clear it
        store.reset_all();
        gate.notify_one();
        task.await.unwrap();

        let state = data.state();
        assert_eq!(state.data, None);
        assert!(!state.loading);
        assert!(!state.from_cache);
    }

    #[tokio::test]
    async fn test_lagged_watcher_still_sees_reset() {
        let (store, _) = test_store();
        let (fetch, _) = counting(json!([1]));
        let data = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch)
            .revalidate_on_mutation(false)
            .build();
        data.load_data().await;
        data.watch();

        // The watcher has not run yet; bury the reset under other events
        store.reset_all();
        for ts in 1..=300 {
            store.record_update("edges", ts, UpdateOrigin::Fetch);
        }

        wait_for_state(&data, |s| s.data.is_none()).await;
        assert!(!data.has_loaded());
    }

    #[tokio::test]
    async fn test_dispose_stops_following() {
        let (store, _) = test_store();
        let (fetch, calls) = counting(json!([1]));
        let data = ReactiveData::<Vec<i32>>::builder(store.clone(), "things", "list", fetch).build();
        data.watch();
        data.dispose();

        store.set_current_collection(Some("things"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_flag_toggles_around_fetch() {
        let (store, _) = test_store();
        let gate = Arc::new(Notify::new());
        let data =
            ReactiveData::<i32>::builder(store.clone(), "things", "count", gated(json!(3), gate.clone()))
                .build();

        let task = tokio::spawn({
            let data = data.clone();
            async move { data.load_data().await }
        });
        wait_for_state(&data, |s| s.loading).await;
        let mut refreshing = store.watch_refreshing();
        tokio::time::timeout(Duration::from_secs(2), refreshing.wait_for(|r| *r))
            .await
            .unwrap()
            .unwrap();

        gate.notify_one();
        task.await.unwrap();
        assert!(!store.is_refreshing());
    }
}

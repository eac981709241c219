//! Reactive cache store
//!
//! The in-memory source of truth for collection timestamps, the collection
//! currently on screen, and the global refresh indicator. It is an explicit
//! context object: build one per application session and hand an `Arc` of it
//! to every accessor and operation runner.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use super::key::{KeyGenerator, KeyParts};
use super::persistent::PersistentCache;

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// Why a collection timestamp moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// A read brought back data.
    Fetch,
    /// A create/update/delete succeeded.
    Mutation,
    /// A caller pushed data directly.
    Manual,
}

/// Notifications published by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TimestampUpdated {
        collection: String,
        timestamp: i64,
        origin: UpdateOrigin,
    },
    CollectionCleared {
        collection: String,
    },
    /// Every timestamp and cached payload was dropped (logout, tenant switch).
    Reset,
    /// The store was torn down; subscribers should stop.
    Shutdown,
}

#[derive(Debug, Clone)]
struct MirrorEntry {
    collection: String,
    data: Value,
}

#[derive(Debug, Default)]
struct StoreState {
    timestamps: HashMap<String, i64>,
    mirror: HashMap<String, MirrorEntry>,
}

/// Shared reactive cache context.
pub struct CacheStore {
    persistent: PersistentCache,
    keys: KeyGenerator,
    state: Mutex<StoreState>,
    current_collection: watch::Sender<Option<String>>,
    refreshing: watch::Sender<bool>,
    in_flight: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
    epoch: AtomicU64,
    active: AtomicBool,
}

impl CacheStore {
    pub fn new(persistent: PersistentCache, keys: KeyGenerator) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            persistent,
            keys,
            state: Mutex::new(StoreState::default()),
            current_collection: watch::Sender::new(None),
            refreshing: watch::Sender::new(false),
            in_flight: AtomicU64::new(0),
            events,
            epoch: AtomicU64::new(0),
            active: AtomicBool::new(true),
        }
    }

    pub fn persistent(&self) -> &PersistentCache {
        &self.persistent
    }

    pub fn keys(&self) -> &KeyGenerator {
        &self.keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // Poisoning only means another thread panicked mid-update; the maps
        // are still structurally valid.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Start of the session lifecycle.
    pub fn init(&self) {
        self.active.store(true, Ordering::SeqCst);
        log::debug!("Cache store initialised");
    }

    /// End of the session lifecycle: drop in-memory state, stop subscribers.
    ///
    /// Persistent entries are kept so the next session starts warm.
    pub fn teardown(&self) {
        self.active.store(false, Ordering::SeqCst);
        {
            let mut state = self.lock();
            state.timestamps.clear();
            state.mirror.clear();
        }
        self.current_collection.send_replace(None);
        self.in_flight.store(0, Ordering::SeqCst);
        self.refreshing.send_replace(false);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.publish(StoreEvent::Shutdown);
        log::debug!("Cache store torn down");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Subscribe to store events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Counter bumped by every reset; lets in-flight work detect a switch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Mark `collection` as updated now.
    pub fn update_timestamp(&self, collection: &str) -> i64 {
        self.record_update(collection, Utc::now().timestamp_millis(), UpdateOrigin::Manual)
    }

    /// Mark `collection` as updated at `timestamp`.
    ///
    /// The stored value never moves backwards; the effective timestamp is
    /// returned and published to subscribers.
    pub fn record_update(&self, collection: &str, timestamp: i64, origin: UpdateOrigin) -> i64 {
        let effective = {
            let mut state = self.lock();
            let slot = state
                .timestamps
                .entry(collection.to_string())
                .or_insert(timestamp);
            *slot = (*slot).max(timestamp);
            *slot
        };

        self.publish(StoreEvent::TimestampUpdated {
            collection: collection.to_string(),
            timestamp: effective,
            origin,
        });
        effective
    }

    /// Last update time of `collection`, if any.
    pub fn timestamp(&self, collection: &str) -> Option<i64> {
        self.lock().timestamps.get(collection).copied()
    }

    /// Whether `collection` changed after `since`.
    pub fn is_stale(&self, collection: &str, since: Option<i64>) -> bool {
        match (self.timestamp(collection), since) {
            (Some(current), Some(seen)) => current > seen,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Cache a payload for (collection, operation, id).
    pub fn store_data(&self, collection: &str, operation: &str, id: Option<&str>, payload: &Value) {
        self.store_entry(KeyParts::new(collection, operation).id(id), payload);
    }

    /// Cache a payload for a full key description, params included.
    pub fn store_entry(&self, parts: KeyParts<'_>, payload: &Value) {
        let key = self.keys.generate(parts);
        self.store_at(&key, parts.collection, payload);
    }

    /// Cache a payload under an already generated key.
    pub fn store_at(&self, key: &str, collection: &str, payload: &Value) {
        self.lock().mirror.insert(
            key.to_string(),
            MirrorEntry {
                collection: collection.to_string(),
                data: payload.clone(),
            },
        );
        self.persistent.set(key, payload);
        self.prune_evicted();
    }

    /// Drop mirrored payloads whose stored copy was evicted.
    fn prune_evicted(&self) {
        let evicted = self.persistent.take_evicted();
        if evicted.is_empty() {
            return;
        }
        let mut state = self.lock();
        for key in &evicted {
            state.mirror.remove(key);
        }
        log::debug!("Dropped {} evicted entries from memory", evicted.len());
    }

    /// Cached payload for (collection, operation, id).
    pub fn get_data(&self, collection: &str, operation: &str, id: Option<&str>) -> Option<Value> {
        self.get_entry(KeyParts::new(collection, operation).id(id))
    }

    /// Cached payload for a full key description: memory first, then storage.
    pub fn get_entry(&self, parts: KeyParts<'_>) -> Option<Value> {
        let key = self.keys.generate(parts);
        self.get_at(&key, parts.collection)
    }

    /// Cached payload under an already generated key.
    pub fn get_at(&self, key: &str, collection: &str) -> Option<Value> {
        // Writes that bypass the store can still evict
        self.prune_evicted();
        if let Some(entry) = self.lock().mirror.get(key) {
            log::debug!("Memory hit: {}", key);
            return Some(entry.data.clone());
        }

        let data = self.persistent.get_value(key)?;
        log::debug!("Storage hit: {}", key);
        self.lock().mirror.insert(
            key.to_string(),
            MirrorEntry {
                collection: collection.to_string(),
                data: data.clone(),
            },
        );
        Some(data)
    }

    /// Forget one cached payload, in memory and in storage.
    pub fn remove_entry(&self, parts: KeyParts<'_>) {
        let key = self.keys.generate(parts);
        self.lock().mirror.remove(&key);
        self.persistent.remove(&key);
    }

    /// Drop every cached payload of `collection`, in memory and in storage.
    pub fn clear_collection_data(&self, collection: &str) -> usize {
        let in_memory = {
            let mut state = self.lock();
            let before = state.mirror.len();
            state.mirror.retain(|_, entry| entry.collection != collection);
            before - state.mirror.len()
        };
        let stored = self.persistent.clear_collection(collection, None);
        log::debug!(
            "Cleared {} ({} in memory, {} stored)",
            collection,
            in_memory,
            stored
        );
        self.publish(StoreEvent::CollectionCleared {
            collection: collection.to_string(),
        });
        stored.max(in_memory)
    }

    /// Record which collection the user is looking at.
    pub fn set_current_collection(&self, collection: Option<&str>) {
        let next = collection.map(str::to_string);
        self.current_collection.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn current_collection(&self) -> Option<String> {
        self.current_collection.borrow().clone()
    }

    pub fn watch_current_collection(&self) -> watch::Receiver<Option<String>> {
        self.current_collection.subscribe()
    }

    /// Begin a background refresh. Returns `false` if one was already running.
    pub fn start_refresh(&self) -> bool {
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            self.refreshing.send_replace(true);
            true
        } else {
            false
        }
    }

    /// End a background refresh; the flag drops once none are running.
    pub fn end_refresh(&self) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        if previous <= 1 {
            self.refreshing.send_replace(false);
        }
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.borrow()
    }

    pub fn watch_refreshing(&self) -> watch::Receiver<bool> {
        self.refreshing.subscribe()
    }

    /// Drop every timestamp and cached payload, in memory and in storage.
    ///
    /// Must run before the first fetch of a new tenant.
    pub fn reset_all(&self) {
        {
            let mut state = self.lock();
            state.timestamps.clear();
            state.mirror.clear();
        }
        let removed = self.persistent.clear_all();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        log::debug!("Cache reset, {} stored entries removed", removed);
        self.publish(StoreEvent::Reset);
    }
}

//! Best-effort persistent key-value cache
//!
//! Every public method is total: storage failures are logged and reported
//! as a miss or a dropped write. Internally each step returns
//! `Result<_, CacheError>` so a miss and a failure stay distinguishable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::backend::StorageBackend;
use super::eviction::{EntryMeta, EvictionStrategy, OldestPercent};
use super::key::{DEFAULT_PREFIX, parse_key};
use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// Stored form of a cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    data: Value,
    timestamp: i64,
}

/// Statistics about cache state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub corrupted_entries: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

/// Namespaced, quota-aware cache over a [`StorageBackend`].
pub struct PersistentCache {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
    eviction: Box<dyn EvictionStrategy>,
    /// Keys evicted since the last [`PersistentCache::take_evicted`]
    evicted: Mutex<Vec<String>>,
}

impl PersistentCache {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_prefix(backend, DEFAULT_PREFIX)
    }

    pub fn with_prefix(backend: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            eviction: Box::new(OldestPercent::default()),
            evicted: Mutex::new(Vec::new()),
        }
    }

    /// Replace the eviction policy.
    pub fn with_eviction(mut self, eviction: Box<dyn EvictionStrategy>) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespace(&self) -> String {
        format!("{}:", self.prefix)
    }

    /// Store a payload stamped with the current time.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, payload: &T) {
        self.set_with_timestamp(key, payload, Utc::now().timestamp_millis());
    }

    /// Store a payload with an explicit `storedAt` (milliseconds).
    pub fn set_with_timestamp<T: Serialize + ?Sized>(&self, key: &str, payload: &T, stored_at: i64) {
        let serialized = match encode(payload, stored_at) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Cache write skipped for {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.write(key, &serialized) {
            log::warn!("Cache write dropped for {}: {}", key, e);
        }
    }

    fn write(&self, key: &str, serialized: &str) -> Result<()> {
        match self.backend.set_item(key, serialized) {
            Err(e) if e.is_quota_exceeded() => {
                let evicted = self.evict()?;
                log::debug!(
                    "Cache quota exceeded, evicted {} entries via {}",
                    evicted,
                    self.eviction.name()
                );
                self.backend.set_item(key, serialized)
            }
            other => other,
        }
    }

    /// Remove entries chosen by the eviction policy.
    fn evict(&self) -> Result<usize> {
        let entries = self.entry_meta()?;
        let victims = self.eviction.select(&entries);
        let mut removed = Vec::with_capacity(victims.len());
        let outcome = victims.iter().try_for_each(|key| {
            self.backend.remove_item(key)?;
            removed.push(key.clone());
            Ok::<(), CacheError>(())
        });

        let count = removed.len();
        self.evicted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(removed);
        outcome.map(|()| count)
    }

    fn entry_meta(&self) -> Result<Vec<EntryMeta>> {
        let keys = self.backend.keys_with_prefix(&self.namespace())?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let stored_at = match self.read_envelope(&key) {
                Ok(Some(env)) => env.timestamp,
                // Unreadable entries are the first to go
                _ => 0,
            };
            entries.push(EntryMeta { key, stored_at });
        }
        Ok(entries)
    }

    fn read_envelope(&self, key: &str) -> Result<Option<Envelope>> {
        match self.backend.get_item(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::Corrupted(e.to_string())),
            None => Ok(None),
        }
    }

    /// Look up an entry, treating failure as a miss.
    fn lookup(&self, key: &str) -> Option<Envelope> {
        match self.read_envelope(key) {
            Ok(found) => found,
            Err(e) => {
                log::debug!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Drain the keys eviction removed, so in-memory copies can follow.
    pub fn take_evicted(&self) -> Vec<String> {
        std::mem::take(&mut *self.evicted.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// Raw JSON payload for `key`.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.lookup(key).map(|env| env.data)
    }

    /// Typed payload for `key`; a payload of the wrong shape is a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|data| serde_json::from_value(data).ok())
    }

    /// Typed payload, only if stored within `max_age`.
    pub fn get_fresh<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
        let env = self.lookup(key)?;
        let age = Utc::now().timestamp_millis().saturating_sub(env.timestamp);
        if age < 0 || age as u128 > max_age.as_millis() {
            log::debug!("Cache entry expired: {}", key);
            return None;
        }
        serde_json::from_value(env.data).ok()
    }

    /// When `key` was stored, in milliseconds.
    pub fn get_timestamp(&self, key: &str) -> Option<i64> {
        self.lookup(key).map(|env| env.timestamp)
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove_item(key) {
            log::warn!("Cache remove failed for {}: {}", key, e);
        }
    }

    /// Remove every entry of `collection`, optionally only for one user.
    pub fn clear_collection(&self, collection: &str, user_id: Option<&str>) -> usize {
        match self.try_clear_collection(collection, user_id) {
            Ok(n) => {
                log::debug!("Cleared {} cached entries for {}", n, collection);
                n
            }
            Err(e) => {
                log::warn!("Failed to clear cache for {}: {}", collection, e);
                0
            }
        }
    }

    fn try_clear_collection(&self, collection: &str, user_id: Option<&str>) -> Result<usize> {
        let keys = self.backend.keys_with_prefix(&self.namespace())?;
        let mut removed = 0;
        for key in keys {
            let Some(parsed) = parse_key(&self.prefix, &key) else {
                continue;
            };
            if parsed.collection != collection {
                continue;
            }
            if user_id.is_some_and(|user| parsed.user_id != user) {
                continue;
            }
            self.backend.remove_item(&key)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Wipe the entire cache namespace.
    pub fn clear_all(&self) -> usize {
        match self.backend.clear_prefix(&self.namespace()) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("Failed to clear cache: {}", e);
                0
            }
        }
    }

    /// Cache statistics; empty when storage is unavailable.
    pub fn stats(&self) -> CacheStats {
        let entries = match self.entry_meta() {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to read cache stats: {}", e);
                return CacheStats::default();
            }
        };

        let valid: Vec<i64> = entries
            .iter()
            .map(|e| e.stored_at)
            .filter(|ts| *ts > 0)
            .collect();

        CacheStats {
            total_entries: entries.len(),
            corrupted_entries: entries.len() - valid.len(),
            total_size_bytes: self.backend.used_bytes().unwrap_or(0),
            oldest_entry: valid.iter().min().copied(),
            newest_entry: valid.iter().max().copied(),
        }
    }
}

fn encode<T: Serialize + ?Sized>(payload: &T, stored_at: i64) -> Result<String> {
    let envelope = Envelope {
        data: serde_json::to_value(payload)?,
        timestamp: stored_at,
    };
    Ok(serde_json::to_string(&envelope)?)
}

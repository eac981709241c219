//! Client-side cache for PocketBase reads
//!
//! Layers, bottom up: a string key-value [`backend`] with a quota, the
//! namespaced [`persistent`] cache with timestamps and eviction, tenant-scoped
//! [`key`] generation, and the reactive [`store`] that tracks per-collection
//! timestamps and fans out change events. [`client`] wraps a record API so
//! reads are served from the persistent layer.

pub mod backend;
pub mod client;
pub mod eviction;
pub mod key;
pub mod persistent;
pub mod store;

// Re-export main types
pub use backend::{MemoryBackend, SqliteBackend, StorageBackend, UnavailableBackend};
pub use client::{CacheMode, CachedRecordApi};
pub use eviction::{EvictionStrategy, OldestCount, OldestPercent};
pub use key::{KeyGenerator, KeyParts, ScopeProvider, SessionScope, TenantScope, generate_key};
pub use persistent::{CacheStats, PersistentCache};
pub use store::{CacheStore, StoreEvent, UpdateOrigin};

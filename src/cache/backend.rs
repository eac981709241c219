//! Storage media for the persistent cache
//!
//! A backend is a flat string key-value store with a quota signal, the same
//! shape as browser local storage. The SQLite backend makes entries survive
//! process restarts; the memory backend serves tests and `--no-cache` runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

type Result<T> = std::result::Result<T, CacheError>;

/// A string key-value medium that can refuse writes once full.
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store a value. Fails with [`CacheError::QuotaExceeded`] when full.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    /// Every key starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Total bytes currently stored (keys plus values).
    fn used_bytes(&self) -> Result<usize>;

    /// Remove every key starting with `prefix`, returning how many went.
    fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.keys_with_prefix(prefix)?;
        for key in &keys {
            self.remove_item(key)?;
        }
        Ok(keys.len())
    }
}

/// In-process backend with optional byte and entry quotas.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: Mutex<HashMap<String, String>>,
    max_bytes: Option<usize>,
    max_entries: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes that would push the total past `max_bytes`.
    pub fn with_byte_quota(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::default()
        }
    }

    /// Refuse writes that would create more than `max_entries` keys.
    pub fn with_entry_quota(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| CacheError::Storage("memory backend lock poisoned".to_string()))
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.lock()?;

        if let Some(max_entries) = self.max_entries
            && !items.contains_key(key)
            && items.len() >= max_entries
        {
            return Err(CacheError::QuotaExceeded {
                needed: 1,
                available: 0,
            });
        }

        if let Some(max_bytes) = self.max_bytes {
            let existing = items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let used: usize = items.iter().map(|(k, v)| k.len() + v.len()).sum();
            let needed = key.len() + value.len();
            let available = max_bytes.saturating_sub(used - existing);
            if needed > available {
                return Err(CacheError::QuotaExceeded { needed, available });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn used_bytes(&self) -> Result<usize> {
        Ok(self.lock()?.iter().map(|(k, v)| k.len() + v.len()).sum())
    }
}

/// Backend standing in for disabled storage: every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl StorageBackend for UnavailableBackend {
    fn get_item(&self, _key: &str) -> Result<Option<String>> {
        Err(CacheError::Unavailable)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Err(CacheError::Unavailable)
    }

    fn remove_item(&self, _key: &str) -> Result<()> {
        Err(CacheError::Unavailable)
    }

    fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(CacheError::Unavailable)
    }

    fn used_bytes(&self) -> Result<usize> {
        Err(CacheError::Unavailable)
    }
}

/// SQLite-backed durable storage with a byte quota.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    max_bytes: usize,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open or create storage at the default XDG cache location
    pub fn open(max_bytes: usize) -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir, max_bytes)
    }

    /// Get the cache directory path (~/.cache/pbcache on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("pbcache"))
    }

    /// Open storage at a specific directory (for testing)
    pub fn open_at(cache_dir: &Path, max_bytes: usize) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("cache.db");
        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
            return Self::open_at(cache_dir, max_bytes);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                cache_key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                size_bytes INTEGER NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_bytes,
            path: db_path,
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Storage("sqlite connection lock poisoned".to_string()))
    }
}

/// Escape LIKE wildcards so a prefix only matches literally.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

impl StorageBackend for SqliteBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE cache_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        let needed = key.len() + value.len();

        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM kv_entries WHERE cache_key != ?1",
            [key],
            |r| r.get(0),
        )?;
        let available = self.max_bytes.saturating_sub(used.max(0) as usize);
        if needed > available {
            return Err(CacheError::QuotaExceeded { needed, available });
        }

        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (cache_key, value, size_bytes)
             VALUES (?1, ?2, ?3)",
            params![key, value, needed as i64],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM kv_entries WHERE cache_key = ?1", [key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT cache_key FROM kv_entries WHERE cache_key LIKE ?1 ESCAPE '\\'")?;
        let keys = stmt
            .query_map([like_prefix(prefix)], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn used_bytes(&self) -> Result<usize> {
        let used: i64 = self.lock()?.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM kv_entries",
            [],
            |r| r.get(0),
        )?;
        Ok(used.max(0) as usize)
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let deleted = self.lock()?.execute(
            "DELETE FROM kv_entries WHERE cache_key LIKE ?1 ESCAPE '\\'",
            [like_prefix(prefix)],
        )?;
        Ok(deleted)
    }
}

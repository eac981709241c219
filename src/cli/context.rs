//! Command execution context
//!
//! Builds the per-run object graph once: config, storage backend, cache
//! store, session, cached API client and operation runner.

use std::sync::Arc;

use crate::cache::{
    CacheStore, CachedRecordApi, KeyGenerator, MemoryBackend, OldestPercent, PersistentCache,
    SessionScope, SqliteBackend, StorageBackend, UnavailableBackend,
};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::client::PocketBaseClient;
use crate::config::Config;
use crate::error::Result;
use crate::reactive::Operations;
use crate::session::Session;

/// Context for command execution.
pub struct CommandContext {
    /// Loaded configuration with runtime overrides applied
    pub config: Config,
    /// Cached API client (Arc-wrapped so fetch closures can own it)
    pub client: Arc<CachedRecordApi<PocketBaseClient>>,
    pub session: Session,
    pub operations: Operations,
    pub format: OutputFormat,
    /// Whether the persistent cache is in use this run
    pub cache_enabled: bool,
}

impl CommandContext {
    /// Load config and build the context.
    ///
    /// Storage falls back to an unavailable backend (a no-op cache) when
    /// the SQLite file cannot be opened.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let mut config = Config::load_at(opts.config_ref())?;

        if let Some(org) = opts.org_ref() {
            config.org_id = Some(org.to_string());
        }
        if let Some(host) = opts.api_host_ref() {
            config.base_url = Some(host.to_string());
        }

        let cache_enabled = config.cache.enabled && !opts.no_cache;
        let backend = open_backend(&config, cache_enabled);

        let settings = &config.cache;
        let persistent = PersistentCache::with_prefix(backend, settings.prefix.clone())
            .with_eviction(Box::new(OldestPercent::new(settings.eviction_percent)));

        let scope = SessionScope::new(config.scope());
        let keys = KeyGenerator::new(settings.prefix.clone(), Some(Arc::new(scope.clone())));
        let store = Arc::new(CacheStore::new(persistent, keys));
        store.init();

        let raw_client = PocketBaseClient::new(config.base_url(), config.token.clone())?;
        let client = Arc::new(CachedRecordApi::new(
            raw_client,
            store.clone(),
            settings.ttl(),
            cache_enabled,
        ));

        Ok(Self {
            session: Session::new(store.clone(), scope),
            operations: Operations::new(store),
            client,
            config,
            format: opts.format,
            cache_enabled,
        })
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        self.session.store()
    }

    /// Persist the config back to where it was loaded from.
    ///
    /// Runtime overrides (`--org`, `--api-host`) are not saved; callers set
    /// the fields they mean to keep on a freshly loaded copy.
    pub fn save_config(&self, opts: &GlobalOptions, update: impl FnOnce(&mut Config)) -> Result<()> {
        let mut stored = Config::load_at(opts.config_ref())?;
        update(&mut stored);
        stored.save_at(opts.config_ref())
    }
}

impl Drop for CommandContext {
    fn drop(&mut self) {
        self.store().teardown();
    }
}

fn open_backend(config: &Config, enabled: bool) -> Arc<dyn StorageBackend> {
    if !enabled {
        log::debug!("Cache disabled, using in-memory storage");
        return Arc::new(MemoryBackend::new());
    }

    let quota = usize::try_from(config.cache.quota_bytes).unwrap_or(usize::MAX);
    match SqliteBackend::open(quota) {
        Ok(backend) => {
            log::debug!("Cache storage at {}", backend.path().display());
            Arc::new(backend)
        }
        Err(e) => {
            log::warn!("Cache storage unavailable, continuing without it: {}", e);
            Arc::new(UnavailableBackend)
        }
    }
}

//! Configuration management for pbcache

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::key::{DEFAULT_PREFIX, TenantScope};
use crate::client::pocketbase::DEFAULT_BASE_URL;
use crate::error::{ConfigError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// PocketBase server address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Opaque auth token sent as the Authorization header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Signed-in user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Active organization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// Local cache settings
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Local cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Namespace prefix for every cache key
    pub prefix: String,

    /// Storage quota in bytes
    pub quota_bytes: u64,

    /// Share of entries dropped when the quota is hit
    pub eviction_percent: u32,

    /// How long cached API reads are served
    pub default_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: DEFAULT_PREFIX.to_string(),
            quota_bytes: 5 * 1024 * 1024,
            eviction_percent: 20,
            default_ttl_secs: 300,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".pbcache").join("config.yaml"))
    }

    /// Resolve an explicit path or fall back to the default
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` (or the default), treating a missing file as empty
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Save to `path` (or the default)
    pub fn save_at(&self, path: Option<&str>) -> Result<()> {
        self.save_to(Self::resolve_path(path)?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Tenant scope of the configured session, if signed in
    pub fn scope(&self) -> Option<TenantScope> {
        self.user_id
            .as_deref()
            .map(|user| TenantScope::from_parts(Some(user), self.org_id.as_deref()))
    }

    /// Organization of the configured session
    pub fn require_org(&self) -> Result<&str> {
        self.org_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingOrgId.into())
    }

    fn validate(&self) -> Result<()> {
        if self.cache.eviction_percent == 0 || self.cache.eviction_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "cache.eviction_percent must be between 1 and 100, got {}",
                self.cache.eviction_percent
            ))
            .into());
        }
        if self.cache.prefix.is_empty() {
            return Err(ConfigError::Invalid("cache.prefix must not be empty".into()).into());
        }
        Ok(())
    }
}

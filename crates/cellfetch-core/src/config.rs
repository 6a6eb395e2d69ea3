//! Centralized configuration for cellfetch.
//!
//! Constants live on unit structs; the serializable structs are what callers
//! build (or load from JSON) and hand to the constructors. All values are fixed
//! at construction time.

use crate::cache::expiry_after;
use crate::error::{CellFetchError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level constants.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "cellfetch";
    pub const USER_AGENT: &'static str = "cellfetch/0.1";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Default cache sizing, matching the sizes the list view was tuned for.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const MEMORY_CAPACITY_BYTES: u64 = 10 * 1024 * 1024;
    pub const DISK_CAPACITY_BYTES: u64 = 40 * 1024 * 1024;
    pub const DISK_DIR_NAME: &'static str = "imagesDownloadCache";
    pub const DB_FILE_NAME: &'static str = "cache.sqlite";
    /// Default time-to-live for cache entries (1 day).
    pub const ENTRY_TTL_SECS: u64 = 86_400;
}

/// Configuration for the two-tier cache store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CacheStoreConfig {
    /// Capacity of the in-memory tier in bytes.
    pub memory_capacity_bytes: u64,
    /// Capacity of the persistent tier in bytes (0 disables the tier).
    pub disk_capacity_bytes: u64,
    /// Directory holding the persistent tier.
    pub disk_path: PathBuf,
    /// Time-to-live for entries; `None` keeps entries until evicted.
    pub entry_ttl: Option<Duration>,
}

impl CacheStoreConfig {
    /// Memory-only configuration, used by tests and ephemeral callers.
    pub fn memory_only(memory_capacity_bytes: u64) -> Self {
        Self {
            memory_capacity_bytes,
            disk_capacity_bytes: 0,
            disk_path: PathBuf::new(),
            entry_ttl: None,
        }
    }

    /// Path of the SQLite database backing the persistent tier.
    pub fn db_path(&self) -> PathBuf {
        self.disk_path.join(CacheDefaults::DB_FILE_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity_bytes == 0 && self.disk_capacity_bytes == 0 {
            return Err(CellFetchError::Config {
                message: "at least one cache tier must have a non-zero capacity".into(),
            });
        }
        if let Some(ttl) = self.entry_ttl {
            if expiry_after(Utc::now(), ttl).is_none() {
                return Err(CellFetchError::Config {
                    message: format!("entry_ttl of {}s is out of range", ttl.as_secs()),
                });
            }
        }
        if self.disk_capacity_bytes > 0 && self.disk_path.as_os_str().is_empty() {
            return Err(CellFetchError::Config {
                message: "disk_path is required when disk_capacity_bytes > 0".into(),
            });
        }
        Ok(())
    }
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            memory_capacity_bytes: CacheDefaults::MEMORY_CAPACITY_BYTES,
            disk_capacity_bytes: CacheDefaults::DISK_CAPACITY_BYTES,
            disk_path: base
                .join(AppConfig::APP_NAME)
                .join(CacheDefaults::DISK_DIR_NAME),
            entry_ttl: Some(Duration::from_secs(CacheDefaults::ENTRY_TTL_SECS)),
        }
    }
}

/// Top-level configuration for a fetch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PipelineConfig {
    pub cache: CacheStoreConfig,
    /// Bound on each network request.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheStoreConfig::default(),
            request_timeout: NetworkConfig::REQUEST_TIMEOUT,
            user_agent: AppConfig::USER_AGENT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| CellFetchError::io_with_path(e, path))?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.cache.validate()?;
        Ok(config)
    }
}

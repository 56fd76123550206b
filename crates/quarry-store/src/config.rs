//! Store configuration.
//!
//! [`StoreConfig`] controls where the database lives, how the second-level
//! query cache behaves and how pages are sized. Defaults come from the
//! [`Default`] implementations; values can be loaded from TOML and then
//! overridden from the environment.
//!
//! ```toml
//! database_path = "data/quarry.db"
//!
//! [cache]
//! max_capacity = 10000
//! default_timeout_secs = 300
//! expiration_mode = "sliding"
//! cache_all_queries = false
//!
//! [paging]
//! default_page_size = 25
//! max_page_size = 500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use quarry_spec::ExpirationMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Overrides [`StoreConfig::database_path`].
pub const ENV_DATABASE_PATH: &str = "QUARRY_DATABASE_PATH";

/// Overrides [`CacheConfig::cache_all_queries`].
pub const ENV_CACHE_ALL_QUERIES: &str = "QUARRY_CACHE_ALL_QUERIES";

/// Top-level store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    ///
    /// Default: **`quarry.db`**.
    pub database_path: PathBuf,
    pub cache: CacheConfig,
    pub paging: PagingConfig,
}

/// Second-level query cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached query results.
    ///
    /// Default: **10 000**.
    pub max_capacity: u64,

    /// Lifetime of an entry whose specification sets no timeout.
    ///
    /// Default: **300 s**.
    pub default_timeout_secs: u64,

    /// Expiration used when the specification sets none.
    ///
    /// Default: **absolute**.
    pub expiration_mode: ExpirationMode,

    /// Cache queries whose specification neither enables nor disables
    /// caching.
    ///
    /// Default: **false**.
    pub cache_all_queries: bool,
}

/// Page sizing for paged repository reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Page size used when a pagination filter leaves it unset.
    ///
    /// Default: **25**.
    pub default_page_size: usize,

    /// Upper bound applied to every pagination filter.
    ///
    /// Default: **500**.
    pub max_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("quarry.db"),
            cache: CacheConfig::default(),
            paging: PagingConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            default_timeout_secs: 300,
            expiration_mode: ExpirationMode::Absolute,
            cache_all_queries: false,
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 500,
        }
    }
}

impl CacheConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?.with_env_overrides()?;
        info!(path = %path.display(), "store configuration loaded");
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> StoreResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE_PATH) {
            debug!(key = ENV_DATABASE_PATH, "database path overridden");
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = get(ENV_CACHE_ALL_QUERIES) {
            self.cache.cache_all_queries = parse_flag(ENV_CACHE_ALL_QUERIES, &raw)?;
            debug!(
                key = ENV_CACHE_ALL_QUERIES,
                value = self.cache.cache_all_queries,
                "cache policy overridden"
            );
        }
        Ok(self)
    }

    /// Set the database file.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the maximum number of cached results.
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache.max_capacity = capacity;
        self
    }

    /// Set the fallback cache entry lifetime.
    pub fn with_cache_timeout(mut self, timeout: Duration, mode: ExpirationMode) -> Self {
        self.cache.default_timeout_secs = timeout.as_secs();
        self.cache.expiration_mode = mode;
        self
    }

    /// Cache every query that does not opt out.
    pub fn with_cache_all_queries(mut self, enabled: bool) -> Self {
        self.cache.cache_all_queries = enabled;
        self
    }

    pub fn with_page_sizes(mut self, default_page_size: usize, max_page_size: usize) -> Self {
        self.paging.default_page_size = default_page_size;
        self.paging.max_page_size = max_page_size;
        self
    }

    fn validate(&self) -> StoreResult<()> {
        if self.paging.max_page_size == 0 {
            return Err(StoreError::InvalidArgument(
                "paging.max_page_size must be greater than zero".into(),
            ));
        }
        if self.paging.default_page_size > self.paging.max_page_size {
            return Err(StoreError::InvalidArgument(format!(
                "paging.default_page_size ({}) exceeds paging.max_page_size ({})",
                self.paging.default_page_size, self.paging.max_page_size
            )));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, raw: &str) -> StoreResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(StoreError::InvalidArgument(format!(
            "{key} must be a boolean, got `{other}`"
        ))),
    }
}

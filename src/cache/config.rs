//! Configuration for the query cache

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default number of cached result sets
pub const DEFAULT_CAPACITY: usize = 100;

/// Default time-to-live of a cached result set (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default number of query records kept in the history ring
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Configuration for the query cache
///
/// TTL is absolute: an entry expires `ttl` after it was stored, no matter how
/// often it is read in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries in the store
    pub capacity: usize,

    /// Time-to-live applied uniformly to every entry
    pub ttl: Duration,

    /// When false every query bypasses the store
    pub enabled: bool,

    /// Number of executed queries remembered by the history
    pub history_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
            enabled: true,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Configuration with caching turned off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CacheResult<()> {
        if self.capacity == 0 {
            return Err(CacheError::ConfigError(
                "capacity must be greater than 0".to_string(),
            ));
        }

        if self.ttl.is_zero() {
            return Err(CacheError::ConfigError(
                "ttl must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from the environment
    ///
    /// Reads a `.env` file if one exists, then:
    /// - `QUERY_CACHE_CAPACITY` (entries)
    /// - `QUERY_CACHE_TTL_SECS` (seconds)
    /// - `QUERY_CACHE_ENABLED` (`true`/`false`)
    /// - `QUERY_CACHE_HISTORY_LIMIT` (records)
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> CacheResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            capacity: parse_var(&lookup, "QUERY_CACHE_CAPACITY")?.unwrap_or(defaults.capacity),
            ttl: parse_var::<u64, _>(&lookup, "QUERY_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            enabled: parse_var(&lookup, "QUERY_CACHE_ENABLED")?.unwrap_or(defaults.enabled),
            history_limit: parse_var(&lookup, "QUERY_CACHE_HISTORY_LIMIT")?
                .unwrap_or(defaults.history_limit),
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> CacheResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CacheError::ConfigError(format!("{}={:?}: {}", name, raw, e))),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    capacity: Option<usize>,
    ttl: Option<Duration>,
    enabled: Option<bool>,
    history_limit: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set maximum number of cache entries
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set time-to-live for cache entries
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enable or disable caching
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set number of history records kept
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            ttl: self.ttl.unwrap_or(defaults.ttl),
            enabled: self.enabled.unwrap_or(defaults.enabled),
            history_limit: self.history_limit.unwrap_or(defaults.history_limit),
        }
    }
}

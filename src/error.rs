//! Error types for cached query execution
//!
//! Two families live here. [`ExecutionError`] is produced by an
//! [`Executor`](crate::executor::Executor) and passes through the cache
//! unchanged. [`CacheError`] covers failures inside the cache layer itself,
//! which never fail a query: they degrade to "execute, don't cache".

use thiserror::Error;

/// Error returned by the underlying query executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Connection error - network or connection pool issues
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Authentication error - invalid credentials or permissions
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Query execution error reported by the database
    #[error("Query error: {0}")]
    QueryError(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_seconds}s: {context}")]
    TimeoutError {
        timeout_seconds: u64,
        context: String,
    },

    /// Connection pool exhausted - no available connections
    #[error("Connection pool exhausted: all {max_connections} connections are in use")]
    PoolExhaustedError { max_connections: usize },

    /// The query was cancelled before it completed
    #[error("Query cancelled: {0}")]
    Cancelled(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for query execution
pub type Result<T> = std::result::Result<T, ExecutionError>;

impl From<String> for ExecutionError {
    fn from(s: String) -> Self {
        ExecutionError::Other(s)
    }
}

impl From<&str> for ExecutionError {
    fn from(s: &str) -> Self {
        ExecutionError::Other(s.to_string())
    }
}

/// Error raised inside the cache layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A cache key could not be computed from the query inputs
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Store bookkeeping no longer satisfies `size <= capacity`
    #[error("Cache consistency error: {size} entries exceed capacity {capacity}")]
    Consistency { size: usize, capacity: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for cache-internal operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

//! # Ouroboros Query Cache (ouroboros-query-cache)
//!
//! A TTL + LRU result cache that sits in front of a SQL execution path.
//!
//! ## Features
//!
//! - Read-through caching of read-only queries, keyed by exact query text and
//!   parameters
//! - Absolute per-entry TTL and least-recently-used eviction at a fixed capacity
//! - Lexical read-only classification that understands comments and quoting
//! - Hit, miss and eviction events through a pluggable sink
//! - Bounded history of executed queries with timing
//! - Configuration from code or from `QUERY_CACHE_*` environment variables
//!
//! ## Usage
//!
//! ```no_run
//! use ouroboros_query_cache::{CacheConfig, CachedExecutor, Executor, QueryResult, SqlValue};
//!
//! struct Database;
//!
//! #[async_trait::async_trait]
//! impl Executor for Database {
//!     async fn execute(
//!         &self,
//!         query: &str,
//!         params: &[SqlValue],
//!     ) -> ouroboros_query_cache::Result<QueryResult> {
//!         // hand the query to a real driver here
//!         # let _ = (query, params);
//!         Ok(QueryResult::default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     ouroboros_query_cache::logging::init_tracing("ouroboros_query_cache=info");
//!
//!     let db = CachedExecutor::new(Database, CacheConfig::from_env()?);
//!     let jobs = db.execute("SELECT * FROM jobs WHERE state = $1", &["open".into()]).await?;
//!     println!("{}", jobs.to_json_records());
//!
//!     println!("{}", db.cache_stats().await);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod logging;
pub mod result;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEvent, CacheEventKind, CacheKey, CacheStats, CacheStore,
    EventSink, EvictionReason, KeyDeriver, QueryCache, QueryHistory, QueryOutcome, QueryRecord,
};
pub use classifier::{Classification, Classifier, ReadOnlyClassifier};
pub use error::{CacheError, CacheResult, ExecutionError, Result};
pub use executor::{CachedExecutor, Executor};
pub use result::{Column, QueryResult, SqlValue};

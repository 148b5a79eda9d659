//! # Query Result Cache
//!
//! Bounded, time-limited cache for the results of read-only SQL queries.
//!
//! ## Features
//!
//! - **Exact keys**: SHA-256 over the query text and its typed parameters, no
//!   normalization
//! - **Absolute TTL**: an entry expires a fixed time after it was stored, reads
//!   do not extend it
//! - **LRU eviction**: the least recently used entry makes room once the store
//!   is full
//! - **Read-through**: [`QueryCache`] consults the store, calls the
//!   [`Executor`](crate::executor::Executor) on a miss and stores the result
//! - **Events**: every hit, miss and eviction is reported to an [`EventSink`]
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_query_cache::cache::{CacheConfig, QueryCache};
//! use ouroboros_query_cache::{Executor, QueryResult, SqlValue, Column};
//! use std::time::Duration;
//!
//! struct Static;
//!
//! #[async_trait::async_trait]
//! impl Executor for Static {
//!     async fn execute(
//!         &self,
//!         _query: &str,
//!         _params: &[SqlValue],
//!     ) -> ouroboros_query_cache::Result<QueryResult> {
//!         Ok(QueryResult::new(
//!             vec![Column::new("id", "int8")],
//!             vec![vec![SqlValue::Int(1)]],
//!         ))
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .capacity(1_000)
//!     .ttl(Duration::from_secs(60))
//!     .build();
//! let cache = QueryCache::new(config);
//!
//! let rows = cache.execute("SELECT id FROM jobs", &[], &Static).await?;
//! let again = cache.execute("SELECT id FROM jobs", &[], &Static).await?;
//! assert!(std::sync::Arc::ptr_eq(&rows, &again));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod events;
pub mod history;
pub mod key;
pub mod query;
pub mod stats;
pub mod store;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, CacheMetadata};
pub use events::{
    CacheEvent, CacheEventKind, EventSink, EvictionReason, MemorySink, NoopSink, TracingSink,
};
pub use history::{HistorySummary, QueryHistory, QueryOutcome, QueryRecord};
pub use key::{CacheKey, KeyDeriver};
pub use query::QueryCache;
pub use stats::CacheStats;
pub use store::CacheStore;

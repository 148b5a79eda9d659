//! Query execution seam
//!
//! The cache never talks to a database itself. Whatever runs SQL (a pooled
//! connection, a remote service, an in-memory fake) implements [`Executor`].
//! [`CachedExecutor`] pairs one executor with a shared [`QueryCache`].

use crate::cache::{CacheConfig, CacheStats, QueryCache};
use crate::error::Result;
use crate::result::{QueryResult, SqlValue};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs a query against the backing database
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<QueryResult>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<QueryResult> {
        (**self).execute(query, params).await
    }
}

/// An executor with a query cache in front of it
pub struct CachedExecutor<E> {
    executor: E,
    cache: Arc<QueryCache>,
}

impl<E: Executor> CachedExecutor<E> {
    /// Wrap `executor` with a fresh cache built from `config`
    pub fn new(executor: E, config: CacheConfig) -> Self {
        Self {
            executor,
            cache: Arc::new(QueryCache::new(config)),
        }
    }

    /// Wrap `executor` with a cache shared with other executors
    pub fn with_cache(executor: E, cache: Arc<QueryCache>) -> Self {
        Self { executor, cache }
    }

    /// Execute through the cache
    pub async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<Arc<QueryResult>> {
        self.cache.execute(query, params, &self.executor).await
    }

    /// Execute without consulting or filling the cache
    pub async fn execute_uncached(&self, query: &str, params: &[SqlValue]) -> Result<QueryResult> {
        self.executor.execute(query, params).await
    }

    /// Drop the cached result of one query
    pub async fn invalidate(&self, query: &str, params: &[SqlValue]) -> bool {
        self.cache.invalidate(query, params).await
    }

    /// Drop every cached result
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl<E> std::fmt::Debug for CachedExecutor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedExecutor")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// In-memory executor that counts calls, shared by the unit tests
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::ExecutionError;
    use crate::result::Column;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every query with one row holding the query text.
    /// Queries mentioning `missing_table` fail.
    #[derive(Debug, Default)]
    pub struct CountingExecutor {
        calls: AtomicUsize,
    }

    impl CountingExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Executor for CountingExecutor {
        async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<QueryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.contains("missing_table") {
                return Err(ExecutionError::QueryError(
                    "relation \"missing_table\" does not exist".to_string(),
                ));
            }

            let mut row = vec![SqlValue::from(query)];
            row.extend(params.iter().cloned());
            let mut columns = vec![Column::new("query", "text")];
            columns.extend((1..=params.len()).map(|i| Column::new(format!("${}", i), "unknown")));
            Ok(QueryResult::new(columns, vec![row]))
        }
    }
}

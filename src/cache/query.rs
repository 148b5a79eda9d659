//! Read-through query cache
//!
//! [`QueryCache`] sits between callers and an [`Executor`]. Read-only queries
//! are answered from the [`CacheStore`] while fresh; everything else goes
//! straight to the executor. Failures inside the cache layer never fail a
//! query, they only cost a cache miss.

use crate::cache::{
    config::CacheConfig,
    events::{CacheEvent, EventSink, TracingSink},
    history::{QueryHistory, QueryOutcome, QueryRecord},
    key::KeyDeriver,
    stats::CacheStats,
    store::CacheStore,
};
use crate::classifier::{Classifier, ReadOnlyClassifier};
use crate::error::Result;
use crate::executor::Executor;
use crate::result::{QueryResult, SqlValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cache of query results keyed by query text and parameters
///
/// Share it through an `Arc`; every method takes `&self`.
pub struct QueryCache {
    config: CacheConfig,
    store: Arc<CacheStore>,
    classifier: Arc<dyn Classifier>,
    sink: Arc<dyn EventSink>,
    history: QueryHistory,
    bypassed: AtomicU64,
    key_failures: AtomicU64,
}

impl QueryCache {
    /// Create a cache that classifies with [`ReadOnlyClassifier`] and reports
    /// events to `tracing`
    pub fn new(config: CacheConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a cache that reports every hit, miss and eviction to `sink`
    pub fn with_sink(config: CacheConfig, sink: Arc<dyn EventSink>) -> Self {
        if let Err(e) = config.validate() {
            warn!("Questionable cache configuration: {}", e);
        }

        let store = Arc::new(CacheStore::with_sink(&config, sink.clone()));
        let history = QueryHistory::new(config.history_limit);

        info!(
            "Query cache ready (enabled: {}, capacity: {}, ttl: {:?})",
            config.enabled,
            store.capacity(),
            config.ttl
        );

        Self {
            config,
            store,
            classifier: Arc::new(ReadOnlyClassifier::new()),
            sink,
            history,
            bypassed: AtomicU64::new(0),
            key_failures: AtomicU64::new(0),
        }
    }

    /// Replace the cacheability classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Execute a query, answering from the cache when possible
    ///
    /// Executor errors are returned unchanged and never cached. A hit returns
    /// the same `Arc` that was stored on the original miss.
    pub async fn execute(
        &self,
        query: &str,
        params: &[SqlValue],
        executor: &dyn Executor,
    ) -> Result<Arc<QueryResult>> {
        let started = Instant::now();

        if !self.config.enabled || !self.classifier.is_cacheable(query) {
            return self.bypass(query, params, executor, started).await;
        }

        let key = match KeyDeriver::derive(query, params) {
            Ok(key) => key,
            Err(e) => {
                warn!("Executing without cache: {}", e);
                self.key_failures.fetch_add(1, Ordering::Relaxed);
                return self.bypass(query, params, executor, started).await;
            }
        };

        if let Some(entry) = self.store.get(&key).await {
            self.sink.record(&CacheEvent::hit(key));
            return self
                .finish(query, started, QueryOutcome::Hit, Ok(entry.value))
                .await;
        }

        self.sink.record(&CacheEvent::miss(key));
        let result = match executor.execute(query, params).await {
            Ok(result) => {
                let result = Arc::new(result);
                self.store.put(key, result.clone()).await;
                Ok(result)
            }
            Err(e) => Err(e),
        };

        self.finish(query, started, QueryOutcome::Miss, result).await
    }

    async fn bypass(
        &self,
        query: &str,
        params: &[SqlValue],
        executor: &dyn Executor,
        started: Instant,
    ) -> Result<Arc<QueryResult>> {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
        let result = executor.execute(query, params).await.map(Arc::new);
        self.finish(query, started, QueryOutcome::Bypass, result).await
    }

    async fn finish(
        &self,
        query: &str,
        started: Instant,
        outcome: QueryOutcome,
        result: Result<Arc<QueryResult>>,
    ) -> Result<Arc<QueryResult>> {
        let elapsed = started.elapsed();
        let outcome = if result.is_err() {
            QueryOutcome::Error
        } else {
            outcome
        };

        match (&result, outcome) {
            (Err(e), _) => warn!(
                query,
                elapsed_ms = elapsed.as_millis() as u64,
                "Query failed: {}",
                e
            ),
            (Ok(_), QueryOutcome::Hit) => debug!(
                query,
                elapsed_ms = elapsed.as_millis() as u64,
                "Query answered from cache"
            ),
            (Ok(rows), _) => info!(
                query,
                outcome = %outcome,
                rows = rows.row_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Query executed"
            ),
        }

        self.history
            .record(QueryRecord::new(query, outcome, elapsed))
            .await;
        result
    }

    /// Drop the cached result of one query; returns whether one was present
    pub async fn invalidate(&self, query: &str, params: &[SqlValue]) -> bool {
        match KeyDeriver::derive(query, params) {
            Ok(key) => self.store.invalidate(&key).await,
            Err(_) => false,
        }
    }

    /// Drop every cached result; returns how many were dropped
    pub async fn clear(&self) -> usize {
        self.store.clear().await
    }

    /// Remove expired entries nobody has looked up since they expired
    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }

    /// Store counters plus the bypass and key failure counts
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.store.stats().await;
        stats.bypassed = self.bypassed.load(Ordering::Relaxed);
        stats.key_failures = self.key_failures.load(Ordering::Relaxed);
        stats
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn history(&self) -> &QueryHistory {
        &self.history
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::{CacheEventKind, EvictionReason, MemorySink};
    use crate::error::ExecutionError;
    use crate::executor::mock::CountingExecutor;
    use std::time::Duration;

    fn cache(capacity: usize, ttl_secs: u64) -> (QueryCache, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = CacheConfig::builder()
            .capacity(capacity)
            .ttl(Duration::from_secs(ttl_secs))
            .build();
        (QueryCache::with_sink(config, sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_repeat_query_is_a_hit() {
        let (cache, sink) = cache(10, 300);
        let executor = CountingExecutor::new();

        let first = cache.execute("select * from jobs", &[], &executor).await.unwrap();
        let second = cache.execute("select * from jobs", &[], &executor).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(executor.calls(), 1);
        assert_eq!(sink.count(CacheEventKind::Miss), 1);
        assert_eq!(sink.count(CacheEventKind::Hit), 1);
    }

    #[tokio::test]
    async fn test_jobs_scenario() {
        let (cache, sink) = cache(2, 300);
        let executor = CountingExecutor::new();

        cache.execute("select * from jobs", &[], &executor).await.unwrap();
        cache.execute("select * from jobs", &[], &executor).await.unwrap();
        assert_eq!(executor.calls(), 1);

        cache.execute("select * from companies", &[], &executor).await.unwrap();
        cache.execute("select * from locations", &[], &executor).await.unwrap();
        assert_eq!(
            sink.evicted(EvictionReason::Capacity),
            vec![KeyDeriver::derive_text("select * from jobs")]
        );

        cache.execute("select * from jobs", &[], &executor).await.unwrap();
        assert_eq!(executor.calls(), 4);
        assert_eq!(sink.count(CacheEventKind::Miss), 4);
        assert_eq!(sink.count(CacheEventKind::Hit), 1);
    }

    #[tokio::test]
    async fn test_non_cacheable_bypasses_store() {
        let (cache, sink) = cache(10, 300);
        let executor = CountingExecutor::new();

        for _ in 0..2 {
            cache
                .execute("update jobs set title = 'x'", &[], &executor)
                .await
                .unwrap();
        }

        assert_eq!(executor.calls(), 2);
        assert!(cache.store().is_empty().await);
        assert!(sink.events().is_empty());
        assert_eq!(cache.stats().await.bypassed, 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_bypasses_store() {
        let cache = QueryCache::new(CacheConfig::disabled());
        let executor = CountingExecutor::new();

        cache.execute("select 1", &[], &executor).await.unwrap();
        cache.execute("select 1", &[], &executor).await.unwrap();

        assert!(!cache.is_enabled());
        assert_eq!(executor.calls(), 2);
        assert_eq!(cache.store().size().await, 0);
    }

    #[tokio::test]
    async fn test_params_are_part_of_the_key() {
        let (cache, _) = cache(10, 300);
        let executor = CountingExecutor::new();
        let query = "select * from jobs where id = $1";

        let one = cache.execute(query, &[SqlValue::Int(1)], &executor).await.unwrap();
        let two = cache.execute(query, &[SqlValue::Int(2)], &executor).await.unwrap();

        assert_eq!(executor.calls(), 2);
        assert_ne!(one, two);
    }

    #[tokio::test]
    async fn test_executor_error_is_not_cached() {
        let (cache, _) = cache(10, 300);
        let executor = CountingExecutor::new();

        for _ in 0..2 {
            let err = cache
                .execute("select * from missing_table", &[], &executor)
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutionError::QueryError(_)));
        }

        assert_eq!(executor.calls(), 2);
        assert!(cache.store().is_empty().await);
        assert_eq!(cache.history().summary().await.errors, 2);
    }

    #[tokio::test]
    async fn test_key_failure_executes_uncached() {
        let (cache, _) = cache(10, 300);
        let executor = CountingExecutor::new();
        let params = [SqlValue::Float(f64::NAN)];

        cache.execute("select $1", &params, &executor).await.unwrap();
        cache.execute("select $1", &params, &executor).await.unwrap();

        assert_eq!(executor.calls(), 2);
        assert!(cache.store().is_empty().await);

        let stats = cache.stats().await;
        assert_eq!(stats.key_failures, 2);
        assert_eq!(stats.bypassed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_result_is_reexecuted() {
        let (cache, sink) = cache(10, 300);
        let executor = CountingExecutor::new();

        cache.execute("select * from jobs", &[], &executor).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.execute("select * from jobs", &[], &executor).await.unwrap();

        assert_eq!(executor.calls(), 2);
        assert_eq!(sink.evicted(EvictionReason::Expired).len(), 1);
        assert_eq!(cache.store().size().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (cache, _) = cache(10, 300);
        let executor = CountingExecutor::new();

        cache.execute("select 1", &[], &executor).await.unwrap();
        cache.execute("select 2", &[], &executor).await.unwrap();

        assert!(cache.invalidate("select 1", &[]).await);
        assert!(!cache.invalidate("select 1", &[]).await);
        assert!(!cache.invalidate("select $1", &[SqlValue::Float(f64::NAN)]).await);
        assert_eq!(cache.clear().await, 1);
    }

    #[tokio::test]
    async fn test_history_records_outcomes() {
        let (cache, _) = cache(10, 300);
        let executor = CountingExecutor::new();

        cache.execute("select 1", &[], &executor).await.unwrap();
        cache.execute("select 1", &[], &executor).await.unwrap();
        cache.execute("delete from jobs", &[], &executor).await.unwrap();

        let recent = cache.history().recent(3).await;
        let outcomes: Vec<QueryOutcome> = recent.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![QueryOutcome::Bypass, QueryOutcome::Hit, QueryOutcome::Miss]
        );
        assert_eq!(recent[0].query, "delete from jobs");
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        struct NothingCacheable;
        impl Classifier for NothingCacheable {
            fn is_cacheable(&self, _query: &str) -> bool {
                false
            }
        }

        let cache = QueryCache::new(CacheConfig::default())
            .with_classifier(Arc::new(NothingCacheable));
        let executor = CountingExecutor::new();

        cache.execute("select 1", &[], &executor).await.unwrap();
        cache.execute("select 1", &[], &executor).await.unwrap();
        assert_eq!(executor.calls(), 2);
    }
}

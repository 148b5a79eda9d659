//! Concurrent access to a shared cache

use async_trait::async_trait;
use futures::future::join_all;
use ouroboros_query_cache::{
    CacheConfig, CacheStore, Column, Executor, KeyDeriver, QueryCache, QueryResult, SqlValue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::assert_ok;

fn result(id: i64) -> QueryResult {
    QueryResult::new(vec![Column::new("id", "int8")], vec![vec![SqlValue::Int(id)]])
}

/// Executor that parks every call until released
struct GatedExecutor {
    calls: AtomicUsize,
    gate: Notify,
}

#[async_trait]
impl Executor for GatedExecutor {
    async fn execute(
        &self,
        _query: &str,
        _params: &[SqlValue],
    ) -> ouroboros_query_cache::Result<QueryResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(result(call as i64))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_respect_capacity() {
    let store = Arc::new(CacheStore::new(
        &CacheConfig::builder().capacity(16).build(),
    ));

    let tasks = (0..8).map(|worker| {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let key = KeyDeriver::derive_text(&format!("select {} from t{}", i, worker));
                store.put(key, result(i)).await;
                store.get(&key).await;
                assert!(store.size().await <= store.capacity());
            }
        })
    });

    for outcome in join_all(tasks).await {
        assert_ok!(outcome);
    }

    assert_eq!(store.size().await, 16);
    assert_ok!(store.verify().await);

    let stats = store.stats().await;
    assert_eq!(stats.insertions, 8 * 200);
    assert_eq!(stats.evictions_capacity, 8 * 200 - 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_share_one_result() {
    let cache = Arc::new(QueryCache::new(CacheConfig::default()));
    let executor = EchoCount::default();

    let first = assert_ok!(cache.execute("select * from jobs", &[], &executor).await);

    let reads = (0..32).map(|_| {
        let cache = cache.clone();
        async move { cache.execute("select * from jobs", &[], &EchoCount::default()).await }
    });

    for read in join_all(reads).await {
        let read = assert_ok!(read);
        assert!(Arc::ptr_eq(&first, &read));
    }

    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().await.hits, 32);
}

#[tokio::test]
async fn test_concurrent_misses_both_execute() {
    let cache = Arc::new(QueryCache::new(CacheConfig::default()));
    let executor = Arc::new(GatedExecutor {
        calls: AtomicUsize::new(0),
        gate: Notify::new(),
    });

    let spawn_read = || {
        let cache = cache.clone();
        let executor = executor.clone();
        tokio::spawn(async move { cache.execute("select * from jobs", &[], &executor).await })
    };

    let a = spawn_read();
    let b = spawn_read();

    while executor.calls.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    // Both callers are inside the executor, so the store lock is free.
    assert_eq!(cache.store().size().await, 0);

    executor.gate.notify_waiters();
    assert_ok!(assert_ok!(a.await));
    assert_ok!(assert_ok!(b.await));

    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.store().size().await, 1);
}

#[tokio::test]
async fn test_dropped_execution_stores_nothing() {
    let cache = Arc::new(QueryCache::new(CacheConfig::default()));
    let executor = Arc::new(GatedExecutor {
        calls: AtomicUsize::new(0),
        gate: Notify::new(),
    });

    let pending = {
        let cache = cache.clone();
        let executor = executor.clone();
        tokio::spawn(async move { cache.execute("select * from jobs", &[], &executor).await })
    };

    while executor.calls.load(Ordering::SeqCst) < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    pending.abort();
    assert!(pending.await.is_err());

    assert!(cache.store().is_empty().await);
}

#[derive(Default)]
struct EchoCount {
    calls: AtomicUsize,
}

#[async_trait]
impl Executor for EchoCount {
    async fn execute(
        &self,
        query: &str,
        _params: &[SqlValue],
    ) -> ouroboros_query_cache::Result<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(QueryResult::new(
            vec![Column::new("query", "text")],
            vec![vec![SqlValue::from(query)]],
        ))
    }
}

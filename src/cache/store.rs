//! Bounded result store with LRU eviction and absolute TTL
//!
//! All bookkeeping sits behind one async `RwLock`. Lookups take the write
//! lock because a hit promotes the entry. The lock is only held for the
//! bookkeeping itself; events are handed to the sink after it is released.

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    events::{CacheEvent, EventSink, EvictionReason, TracingSink},
    key::CacheKey,
    stats::CacheStats,
};
use crate::error::{CacheError, CacheResult};
use crate::result::QueryResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Key → entry mapping ordered by recency of access
///
/// Invariant: `size() <= capacity()` once any operation has returned.
pub struct CacheStore {
    capacity: NonZeroUsize,
    ttl: Duration,
    inner: RwLock<StoreInner>,
    sink: Arc<dyn EventSink>,
}

struct StoreInner {
    /// Most recently used at the head, eviction candidate at the tail
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

enum Lookup {
    Fresh(CacheEntry),
    Expired,
    Absent,
}

impl CacheStore {
    /// Create a store sized by `config`, reporting evictions to `tracing`
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a store that reports evictions to `sink`
    pub fn with_sink(config: &CacheConfig, sink: Arc<dyn EventSink>) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or_else(|| {
            warn!("Cache capacity 0 is not usable, falling back to 1");
            NonZeroUsize::MIN
        });

        info!(
            "Initializing cache store (capacity: {}, ttl: {:?})",
            capacity, config.ttl
        );

        Self {
            capacity,
            ttl: config.ttl,
            inner: RwLock::new(StoreInner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..Default::default()
                },
            }),
            sink,
        }
    }

    /// Look up a fresh entry
    ///
    /// A hit promotes the entry to most recently used and bumps its access
    /// metadata. An expired entry is removed and reported as absent.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();

        let lookup = {
            let mut inner = self.inner.write().await;

            let lookup = match inner.entries.get_mut(key) {
                None => Lookup::Absent,
                Some(entry) if entry.is_expired_at(now, self.ttl) => Lookup::Expired,
                Some(entry) => {
                    entry.mark_accessed();
                    Lookup::Fresh(entry.clone())
                }
            };

            match lookup {
                Lookup::Fresh(_) => inner.stats.hits += 1,
                Lookup::Expired => {
                    inner.entries.pop(key);
                    inner.stats.misses += 1;
                    inner.stats.evictions_ttl += 1;
                    inner.stats.entries = inner.entries.len();
                }
                Lookup::Absent => inner.stats.misses += 1,
            }

            lookup
        };

        match lookup {
            Lookup::Fresh(entry) => Some(entry),
            Lookup::Expired => {
                debug!("Cache entry expired: {}", key.short());
                self.sink
                    .record(&CacheEvent::evicted(*key, EvictionReason::Expired));
                None
            }
            Lookup::Absent => None,
        }
    }

    /// Insert or replace an entry
    ///
    /// The entry becomes most recently used with a fresh TTL window. Inserting
    /// a new key into a full store evicts the least recently used entry first.
    /// Replacing an existing key never evicts anything else.
    pub async fn put(&self, key: CacheKey, value: impl Into<Arc<QueryResult>>) {
        let entry = CacheEntry::new(key, value.into());
        let mut events = Vec::new();

        {
            let mut inner = self.inner.write().await;

            match inner.entries.push(key, entry) {
                Some((previous, _)) if previous == key => {
                    debug!("Replaced cache entry: {}", key.short());
                }
                Some((evicted, _)) => {
                    debug!(
                        "Evicting entry due to capacity limit: {} (inserting {})",
                        evicted.short(),
                        key.short()
                    );
                    inner.stats.evictions_capacity += 1;
                    events.push(CacheEvent::evicted(evicted, EvictionReason::Capacity));
                }
                None => {
                    debug!("Inserted cache entry: {}", key.short());
                }
            }

            inner.stats.insertions += 1;
            self.enforce_capacity(&mut inner, &mut events);
            inner.stats.entries = inner.entries.len();
        }

        self.emit(&events);
    }

    /// Remove an entry; returns whether one was present
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner.entries.pop(key).is_some();
            if removed {
                inner.stats.invalidations += 1;
                inner.stats.entries = inner.entries.len();
            }
            removed
        };

        if removed {
            debug!("Invalidated cache entry: {}", key.short());
            self.sink
                .record(&CacheEvent::evicted(*key, EvictionReason::Invalidated));
        }
        removed
    }

    /// Remove every entry; returns how many were dropped
    pub async fn clear(&self) -> usize {
        let keys: Vec<CacheKey> = {
            let mut inner = self.inner.write().await;
            let keys: Vec<CacheKey> = inner.entries.iter().map(|(k, _)| *k).collect();
            inner.entries.clear();
            inner.stats.invalidations += keys.len() as u64;
            inner.stats.entries = 0;
            keys
        };

        let events: Vec<CacheEvent> = keys
            .iter()
            .map(|k| CacheEvent::evicted(*k, EvictionReason::Cleared))
            .collect();
        self.emit(&events);

        info!("Cleared {} entries from cache", keys.len());
        keys.len()
    }

    /// Remove every expired entry; returns how many were dropped
    ///
    /// Lookups already discard expired entries, so this only reclaims memory
    /// held by entries nobody asks for any more.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();

        let expired: Vec<CacheKey> = {
            let mut inner = self.inner.write().await;
            let expired: Vec<CacheKey> = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now, self.ttl))
                .map(|(k, _)| *k)
                .collect();

            for key in &expired {
                inner.entries.pop(key);
            }
            inner.stats.evictions_ttl += expired.len() as u64;
            inner.stats.entries = inner.entries.len();
            expired
        };

        if !expired.is_empty() {
            debug!("Purged {} expired entries", expired.len());
            let events: Vec<CacheEvent> = expired
                .iter()
                .map(|k| CacheEvent::evicted(*k, EvictionReason::Expired))
                .collect();
            self.emit(&events);
        }
        expired.len()
    }

    /// Whether a fresh entry exists, without touching recency or expiry
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.read().await;
        inner
            .entries
            .peek(key)
            .map(|entry| !entry.is_expired(self.ttl))
            .unwrap_or(false)
    }

    /// Current number of entries
    pub async fn size(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Snapshot of the store counters
    pub async fn stats(&self) -> CacheStats {
        self.inner.read().await.stats.clone()
    }

    /// Check the store bookkeeping
    ///
    /// `LruCache` never grows past the capacity it was built with, so this
    /// only fails if that guarantee is broken.
    pub async fn verify(&self) -> CacheResult<()> {
        let inner = self.inner.read().await;
        let size = inner.entries.len();
        if size > self.capacity.get() {
            return Err(CacheError::Consistency {
                size,
                capacity: self.capacity.get(),
            });
        }
        Ok(())
    }

    /// Restore `size <= capacity` if the bookkeeping ever drifts
    ///
    /// Unreachable while `LruCache` bounds itself to its capacity.
    fn enforce_capacity(&self, inner: &mut StoreInner, events: &mut Vec<CacheEvent>) {
        let capacity = self.capacity.get();
        let size = inner.entries.len();
        if size <= capacity {
            return;
        }

        debug_assert!(
            size <= capacity,
            "cache store holds {} entries with capacity {}",
            size,
            capacity
        );
        error!(size, capacity, "Cache store exceeded its capacity, evicting to recover");

        shrink_to(inner, capacity, events);
    }

    fn emit(&self, events: &[CacheEvent]) {
        for event in events {
            self.sink.record(event);
        }
    }
}

/// Evict least recently used entries until at most `capacity` remain
fn shrink_to(inner: &mut StoreInner, capacity: usize, events: &mut Vec<CacheEvent>) -> usize {
    let mut evicted = 0;
    while inner.entries.len() > capacity {
        match inner.entries.pop_lru() {
            Some((key, _)) => {
                inner.stats.evictions_capacity += 1;
                events.push(CacheEvent::evicted(key, EvictionReason::Capacity));
                evicted += 1;
            }
            None => break,
        }
    }
    inner.stats.entries = inner.entries.len();
    evicted
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

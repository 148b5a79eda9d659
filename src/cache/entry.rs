//! Cache entry with absolute TTL

use crate::cache::key::CacheKey;
use crate::result::QueryResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A cached result set and its bookkeeping
///
/// Entries handed out by the store are clones. The result itself is shared
/// behind an `Arc` and is never mutated once stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached result set
    pub value: Arc<QueryResult>,

    /// Entry metadata
    pub metadata: CacheMetadata,

    /// Monotonic insertion time; expiry is measured from here
    inserted: Instant,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new(key: CacheKey, value: Arc<QueryResult>) -> Self {
        Self::created_at(key, value, Instant::now())
    }

    /// Create an entry inserted at a given monotonic instant
    pub fn created_at(key: CacheKey, value: Arc<QueryResult>, inserted: Instant) -> Self {
        let now = Utc::now();

        Self {
            key,
            value,
            metadata: CacheMetadata {
                created_at: now,
                accessed_at: now,
                access_count: 0,
            },
            inserted,
        }
    }

    /// Check whether the entry is older than `ttl` at instant `now`
    ///
    /// An entry aged exactly `ttl` is still fresh.
    pub fn is_expired_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted) > ttl
    }

    /// Check whether the entry is older than `ttl` right now
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(Instant::now(), ttl)
    }

    /// Time left before the entry expires, `None` once it has
    pub fn time_to_live(&self, ttl: Duration) -> Option<Duration> {
        let age = self.age();
        if age > ttl {
            None
        } else {
            Some(ttl - age)
        }
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.inserted)
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.metadata.accessed_at = Utc::now();
        self.metadata.access_count += 1;
    }
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetadata {
    /// When the entry was stored
    pub created_at: DateTime<Utc>,

    /// Last time the entry was returned by a lookup
    pub accessed_at: DateTime<Utc>,

    /// Number of lookups that returned this entry
    pub access_count: u64,
}

//! Observability events emitted by the cache
//!
//! Every lookup produces a `cache_hit` or `cache_miss` event and every entry
//! leaving the store produces a `cache_evict` event carrying the reason. Events
//! go to an [`EventSink`]; the default [`TracingSink`] forwards them to
//! `tracing` with structured fields.

use crate::cache::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

/// Kind of cache event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheEventKind {
    #[serde(rename = "cache_hit")]
    Hit,
    #[serde(rename = "cache_miss")]
    Miss,
    #[serde(rename = "cache_evict")]
    Evict,
}

impl CacheEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEventKind::Hit => "cache_hit",
            CacheEventKind::Miss => "cache_miss",
            CacheEventKind::Evict => "cache_evict",
        }
    }
}

impl fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an entry left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Least recently used entry removed to make room
    Capacity,

    /// Entry found older than the TTL
    Expired,

    /// Removed by an explicit invalidation
    Invalidated,

    /// Removed by clearing the whole store
    Cleared,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Capacity => write!(f, "LRU eviction"),
            EvictionReason::Expired => write!(f, "TTL expired"),
            EvictionReason::Invalidated => write!(f, "manual invalidation"),
            EvictionReason::Cleared => write!(f, "cache cleared"),
        }
    }
}

/// Structured cache event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEvent {
    /// What happened
    pub event: CacheEventKind,

    /// Key the event refers to
    pub key: CacheKey,

    /// When it happened
    pub timestamp: DateTime<Utc>,

    /// Set for evictions only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EvictionReason>,
}

impl CacheEvent {
    pub fn hit(key: CacheKey) -> Self {
        Self::new(CacheEventKind::Hit, key, None)
    }

    pub fn miss(key: CacheKey) -> Self {
        Self::new(CacheEventKind::Miss, key, None)
    }

    pub fn evicted(key: CacheKey, reason: EvictionReason) -> Self {
        Self::new(CacheEventKind::Evict, key, Some(reason))
    }

    fn new(event: CacheEventKind, key: CacheKey, reason: Option<EvictionReason>) -> Self {
        Self {
            event,
            key,
            timestamp: Utc::now(),
            reason,
        }
    }
}

/// Receiver of cache events
///
/// `record` is called while no cache lock is held, but it runs on the
/// caller's task, so implementations should return quickly.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &CacheEvent);
}

/// Forwards events to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &CacheEvent) {
        match event.reason {
            Some(reason) => debug!(
                event = event.event.as_str(),
                key = %event.key.short(),
                reason = %reason,
                "Cache entry evicted"
            ),
            None => debug!(
                event = event.event.as_str(),
                key = %event.key.short(),
                "Cache lookup"
            ),
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: &CacheEvent) {}
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CacheEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far
    pub fn events(&self) -> Vec<CacheEvent> {
        self.lock().clone()
    }

    /// Number of recorded events of one kind
    pub fn count(&self, kind: CacheEventKind) -> usize {
        self.lock().iter().filter(|e| e.event == kind).count()
    }

    /// Keys evicted for a given reason, oldest first
    pub fn evicted(&self, reason: EvictionReason) -> Vec<CacheKey> {
        self.lock()
            .iter()
            .filter(|e| e.reason == Some(reason))
            .map(|e| e.key)
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CacheEvent>> {
        // A panicking test thread must not hide the events from the others.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &CacheEvent) {
        self.lock().push(event.clone());
    }
}

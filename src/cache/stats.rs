//! Cache statistics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters for cache performance monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Lookups answered from the store
    pub hits: u64,

    /// Lookups that found nothing fresh
    pub misses: u64,

    /// Number of entries currently in the store
    pub entries: usize,

    /// Maximum number of entries
    pub capacity: usize,

    /// Entries evicted to stay within capacity
    pub evictions_capacity: u64,

    /// Entries removed because they outlived the TTL
    pub evictions_ttl: u64,

    /// Entries removed by invalidate or clear
    pub invalidations: u64,

    /// Entries written by put (inserts and replacements)
    pub insertions: u64,

    /// Queries executed without consulting the store
    pub bypassed: u64,

    /// Queries whose key could not be derived
    pub key_failures: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Calculate total evictions
    pub fn total_evictions(&self) -> u64 {
        self.evictions_capacity + self.evictions_ttl
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}/{}, evictions: {}, invalidations: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.capacity,
            self.total_evictions(),
            self.invalidations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 100,
            misses: 50,
            entries: 75,
            capacity: 100,
            evictions_capacity: 10,
            evictions_ttl: 5,
            invalidations: 3,
            insertions: 90,
            bypassed: 4,
            key_failures: 0,
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100"));
        assert!(display.contains("entries: 75/100"));
        assert!(display.contains("evictions: 15"));
    }
}

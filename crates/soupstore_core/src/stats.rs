//! Cache statistics.
//!
//! Counters for the metadata and statement caches of one store.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = SmartStore::open_in_memory()?;
//! store.query(&spec, 0)?;
//!
//! let stats = store.cache_stats();
//! println!("metadata hits: {}", stats.hits());
//! println!("statements released: {}", stats.statements_released());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct CacheStats {
    // Metadata lookups
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,

    // Evictions of any cached entry, for any cause
    evictions: AtomicU64,

    // Compiled statements
    statements_prepared: AtomicU64,
    statements_released: AtomicU64,
    release_failures: AtomicU64,
}

impl CacheStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.record_hit();
        } else {
            self.record_miss();
        }
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prepare(&self) {
        self.statements_prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, ok: bool) {
        self.statements_released.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.release_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    // === Getter methods (public API) ===

    /// Returns the number of metadata lookups answered from cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of metadata lookups that went to storage.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the number of explicit soup invalidations.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Returns the number of cache entries evicted or removed.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns the number of statements prepared for the caches.
    pub fn statements_prepared(&self) -> u64 {
        self.statements_prepared.load(Ordering::Relaxed)
    }

    /// Returns the number of statement releases attempted.
    pub fn statements_released(&self) -> u64 {
        self.statements_released.load(Ordering::Relaxed)
    }

    /// Returns the number of releases the engine rejected.
    pub fn release_failures(&self) -> u64 {
        self.release_failures.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            invalidations: self.invalidations(),
            evictions: self.evictions(),
            statements_prepared: self.statements_prepared(),
            statements_released: self.statements_released(),
            release_failures: self.release_failures(),
        }
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Metadata cache hits.
    pub hits: u64,
    /// Metadata cache misses.
    pub misses: u64,
    /// Explicit invalidations.
    pub invalidations: u64,
    /// Entries evicted or removed.
    pub evictions: u64,
    /// Statements prepared.
    pub statements_prepared: u64,
    /// Statement releases attempted.
    pub statements_released: u64,
    /// Statement releases that failed.
    pub release_failures: u64,
}

impl CacheStatsSnapshot {
    /// Returns statements prepared but not yet released.
    #[must_use]
    pub fn live_statements(&self) -> u64 {
        self.statements_prepared
            .saturating_sub(self.statements_released)
    }

    /// Returns the hit ratio in `[0, 1]`, or 0 with no lookups.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = CacheStats::new();
        stats.record_lookup(true);
        stats.record_lookup(true);
        stats.record_lookup(false);
        stats.record_prepare();
        stats.record_prepare();
        stats.record_release(true);
        stats.record_release(false);

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.statements_released, 2);
        assert_eq!(snap.release_failures, 1);
        assert_eq!(snap.live_statements(), 0);
    }

    #[test]
    fn hit_ratio() {
        let snap = CacheStatsSnapshot {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((snap.hit_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStatsSnapshot::default().hit_ratio(), 0.0);
    }
}

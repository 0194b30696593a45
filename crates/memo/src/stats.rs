//! Lookup statistics for the memo cache

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of cache activity.
///
/// Counters are cumulative over the lifetime of the cache and are not reset
/// by [`MemoCache::purge`](crate::MemoCache::purge).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls to `get_or_add`
    pub lookups: u64,
    /// Lookups answered from a stored entry
    pub hits: u64,
    /// Lookups that started a construction
    pub misses: u64,
    /// Lookups that waited on another caller's in-flight construction
    pub coalesced: u64,
    /// Constructions that returned an error
    pub failures: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
    /// Entries dropped by `purge`
    pub purged: u64,
}

impl CacheStats {
    /// Percentage of lookups answered from a stored entry.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.hits as f64 / self.lookups as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
    purged: AtomicU64,
}

impl Counters {
    pub(crate) fn lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn purged(&self, count: usize) {
        self.purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}

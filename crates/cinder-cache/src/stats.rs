//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache observability.
///
/// All counters are atomic and can be read without locking.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups answered from a `Cached` entry.
    pub hits: AtomicU64,
    /// Lookups that started a backing read.
    pub misses: AtomicU64,
    /// Lookups that rode an in-progress read.
    pub coalesced_hits: AtomicU64,
    /// Lookups that bypassed the cache because a write or invalidation owned
    /// the entry.
    pub read_arounds: AtomicU64,
    /// Entries removed by invalidation, TTL, or capacity pressure.
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn coalesced_hits(&self) -> u64 {
        self.coalesced_hits.load(Ordering::Relaxed)
    }

    pub fn read_arounds(&self) -> u64 {
        self.read_arounds.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

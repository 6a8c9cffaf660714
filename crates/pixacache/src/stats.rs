//! Cache statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for memory cache performance tracking
#[derive(Debug, Default)]
pub struct CacheStats {
    strong_hits: AtomicU64,
    weak_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    puts: AtomicU64,
}

impl CacheStats {
    /// Create a new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_strong_hit(&self) {
        self.strong_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_weak_hit(&self) {
        self.weak_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Hits served from the bounded tier
    pub fn strong_hits(&self) -> u64 {
        self.strong_hits.load(Ordering::Relaxed)
    }

    /// Hits served from the weak tier after strong eviction
    pub fn weak_hits(&self) -> u64 {
        self.weak_hits.load(Ordering::Relaxed)
    }

    /// Total hits across both tiers
    pub fn hits(&self) -> u64 {
        self.strong_hits() + self.weak_hits()
    }

    /// Lookups that found nothing
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Values pushed out of the bounded tier
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Total stores
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Hit ratio across both tiers (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.strong_hits.store(0, Ordering::Relaxed);
        self.weak_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
    }
}

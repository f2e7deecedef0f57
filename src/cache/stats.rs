//! Cache Statistics Module
//!
//! Tracks how image requests were answered and what the background work did.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Image requests answered from the cache
    pub hits: u64,
    /// Image requests that went to the origin
    pub misses: u64,
    /// Image requests answered with the fallback pixel
    pub fallbacks: u64,
    /// Entries evicted due to LRU policy
    pub evictions: u64,
    /// Background refreshes that replaced an entry
    pub refreshes: u64,
    /// Entries stored by prefetching
    pub prefetched: u64,
    /// Current number of cached images
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_fallback(&mut self) {
        self.fallbacks += 1;
    }

    /// Adds `count` evictions.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    /// Adds `count` prefetched entries.
    pub fn record_prefetched(&mut self, count: usize) {
        self.prefetched += count as u64;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.fallbacks, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_fallbacks_do_not_change_hit_rate() {
        let mut stats = CacheStats::new();
        stats.record_miss();
        stats.record_fallback();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.fallbacks, 1);
    }

    #[test]
    fn test_batch_counters() {
        let mut stats = CacheStats::new();
        stats.record_evictions(3);
        stats.record_evictions(2);
        stats.record_prefetched(4);
        stats.record_refresh();
        assert_eq!(stats.evictions, 5);
        assert_eq!(stats.prefetched, 4);
        assert_eq!(stats.refreshes, 1);
    }
}

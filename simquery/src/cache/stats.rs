//! Cache statistics.

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a fresh entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Joins that attached to an operation already in flight.
    pub coalesced: u64,
    /// Entries dropped to stay within the entry limit.
    pub evictions: u64,
    /// Entries currently stored.
    pub entries: usize,
    /// Operations currently in flight.
    pub in_flight: usize,
}

impl CacheStats {
    /// Hit rate over all lookups (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

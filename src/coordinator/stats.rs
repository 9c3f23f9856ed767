//! Coordinator Statistics
//!
//! Read-only snapshot of the coordinator's shared state.

use serde::Serialize;

use crate::cache::CacheStats;

/// Snapshot returned by [`RequestCoordinator::stats`](crate::RequestCoordinator::stats).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorStats {
    /// Network flights currently in progress
    pub pending_count: usize,
    /// Cached responses that have not expired
    pub cached_count: usize,
    /// Signatures whose rate window is currently full
    pub limited_signature_count: usize,
    /// Cache hit/miss/eviction counters
    pub cache: CacheStats,
}

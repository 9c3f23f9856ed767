//! Cache Entry Module
//!
//! Defines the structure for individual cached responses.

use std::time::Duration;

use tokio::time::Instant;

use crate::models::HttpResponse;

// == Cache Entry ==
/// A cached response and the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored response
    pub payload: HttpResponse,
    /// When the response was stored
    pub stored_at: Instant,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current instant.
    pub fn new(payload: HttpResponse) -> Self {
        Self {
            payload,
            stored_at: Instant::now(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has outlived `ttl`.
    ///
    /// Boundary condition: an entry is expired once `now - stored_at >= ttl`,
    /// so a zero TTL expires immediately.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

//! Cache Store Module
//!
//! Response cache keyed by request signature, with lazy TTL expiration and
//! LRU eviction once the capacity is reached.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStats, LruTracker};
use crate::models::{HttpResponse, RequestSignature};

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore {
    /// Signature-to-response storage
    entries: HashMap<RequestSignature, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker<RequestSignature>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Lifetime of every entry
    ttl: Duration,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold
    /// * `ttl` - Lifetime of an entry; zero disables storing
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            ttl,
        }
    }

    // == Get ==
    /// Returns the cached response for `signature`.
    ///
    /// An expired entry is evicted and reported as absent.
    pub fn get(&mut self, signature: &RequestSignature) -> Option<HttpResponse> {
        let expired = match self.entries.get(signature) {
            Some(entry) => entry.is_expired(self.ttl),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove(signature);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(signature);
        self.entries
            .get(signature)
            .map(|entry| entry.payload.clone())
    }

    // == Set ==
    /// Stores `payload` for `signature`, overwriting any previous entry and
    /// restarting its lifetime.
    ///
    /// If the cache is at capacity, the least recently used entry is evicted.
    pub fn set(&mut self, signature: RequestSignature, payload: HttpResponse) {
        if self.ttl.is_zero() || self.max_entries == 0 {
            return;
        }

        let is_overwrite = self.entries.contains_key(&signature);
        if !is_overwrite && self.entries.len() >= self.max_entries {
            if let Some(evicted) = self.lru.evict_oldest() {
                self.entries.remove(&evicted);
                self.stats.record_eviction();
            }
        }

        self.lru.touch(&signature);
        self.entries.insert(signature, CacheEntry::new(payload));
        self.stats.set_total_entries(self.entries.len());
    }

    // == Remove ==
    /// Invalidates one signature. Returns true if an entry was removed.
    pub fn remove(&mut self, signature: &RequestSignature) -> bool {
        let removed = self.entries.remove(signature).is_some();
        if removed {
            self.lru.remove(signature);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Clear ==
    /// Empties the cache. Statistics counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Purge Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let expired: Vec<RequestSignature> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .map(|(signature, _)| signature.clone())
            .collect();

        for signature in &expired {
            self.entries.remove(signature);
            self.lru.remove(signature);
        }

        self.stats.record_expirations(expired.len());
        self.stats.set_total_entries(self.entries.len());
        expired.len()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Number of stored entries that have not expired. Does not evict.
    pub fn live_len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.is_expired(self.ttl))
            .count()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

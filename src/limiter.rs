//! Sliding-window rate limiter
//!
//! Counts recent attempts per request signature. Pruning happens on every
//! check, so memory stays bounded without a background timer.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::RequestSignature;

// == Rate Limiter ==
#[derive(Debug)]
pub struct RateLimiter {
    /// Attempt timestamps per signature, oldest first
    windows: HashMap<RequestSignature, VecDeque<Instant>>,
    /// Sliding window size
    window: Duration,
    /// Attempts allowed inside one window
    max_per_window: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_per_window: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window,
            max_per_window,
        }
    }

    // == Is Limited ==
    /// Prunes timestamps older than the window, then reports whether the
    /// signature has used up its attempts.
    pub fn is_limited(&mut self, signature: &RequestSignature) -> bool {
        let now = Instant::now();
        let count = match self.windows.get_mut(signature) {
            Some(timestamps) => {
                prune(timestamps, now, self.window);
                timestamps.len()
            }
            None => 0,
        };

        if count == 0 {
            self.windows.remove(signature);
        }
        count >= self.max_per_window
    }

    // == Record ==
    /// Records an attempt for `signature` at the current instant.
    pub fn record(&mut self, signature: &RequestSignature) {
        self.windows
            .entry(signature.clone())
            .or_default()
            .push_back(Instant::now());
    }

    // == Retry After ==
    /// How long until the oldest recorded attempt leaves the window.
    ///
    /// Zero when nothing is recorded for the signature.
    pub fn retry_after(&self, signature: &RequestSignature) -> Duration {
        let now = Instant::now();
        self.windows
            .get(signature)
            .and_then(|timestamps| {
                timestamps
                    .iter()
                    .find(|ts| now.duration_since(**ts) <= self.window)
            })
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }

    // == Limited Count ==
    /// Number of signatures currently at or over the limit. Does not prune.
    pub fn limited_count(&self) -> usize {
        let now = Instant::now();
        self.windows
            .values()
            .filter(|timestamps| {
                let live = timestamps
                    .iter()
                    .filter(|ts| now.duration_since(**ts) <= self.window)
                    .count();
                live >= self.max_per_window
            })
            .count()
    }

    // == Purge Idle ==
    /// Drops every bucket whose attempts have all left the window.
    ///
    /// Returns the number of buckets removed.
    pub fn purge_idle(&mut self) -> usize {
        let now = Instant::now();
        let window = self.window;
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, now, window);
            !timestamps.is_empty()
        });
        before - self.windows.len()
    }

    /// Number of signatures with a bucket.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

/// Keeps only timestamps within `[now - window, now]`.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = timestamps.front() {
        if now.duration_since(*front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

//! Configuration Module
//!
//! Handles loading and managing coordinator configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Coordinator configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Lifetime of cached read responses; zero disables caching
    pub cache_ttl: Duration,
    /// Maximum number of cached responses before LRU eviction
    pub max_cache_entries: usize,
    /// Sliding window size for the per-signature rate limiter
    pub rate_window: Duration,
    /// Maximum attempts per signature inside one window
    pub max_per_window: usize,
    /// Total transport attempts allowed when the server keeps answering 429
    pub max_retries: u32,
    /// First backoff delay
    pub backoff_base: Duration,
    /// Growth factor applied per attempt
    pub backoff_multiplier: f64,
    /// Backoff ceiling before jitter
    pub max_backoff_delay: Duration,
}

impl CoordinatorConfig {
    /// Creates a new config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REQUEST_CACHE_TTL_MS` - Cache lifetime in ms (default: 30000)
    /// - `REQUEST_MAX_CACHE_ENTRIES` - Cache capacity (default: 1000)
    /// - `REQUEST_RATE_WINDOW_MS` - Rate window in ms (default: 1000)
    /// - `REQUEST_MAX_PER_WINDOW` - Attempts per window (default: 5)
    /// - `REQUEST_MAX_RETRIES` - Attempts on 429 (default: 3)
    /// - `REQUEST_BACKOFF_BASE_MS` - Base delay in ms (default: 1000)
    /// - `REQUEST_BACKOFF_MULTIPLIER` - Delay multiplier (default: 2)
    /// - `REQUEST_MAX_BACKOFF_MS` - Delay ceiling in ms (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl: env_millis("REQUEST_CACHE_TTL_MS").unwrap_or(defaults.cache_ttl),
            max_cache_entries: env_parse("REQUEST_MAX_CACHE_ENTRIES")
                .unwrap_or(defaults.max_cache_entries),
            rate_window: env_millis("REQUEST_RATE_WINDOW_MS").unwrap_or(defaults.rate_window),
            max_per_window: env_parse("REQUEST_MAX_PER_WINDOW")
                .unwrap_or(defaults.max_per_window),
            max_retries: env_parse("REQUEST_MAX_RETRIES").unwrap_or(defaults.max_retries),
            backoff_base: env_millis("REQUEST_BACKOFF_BASE_MS").unwrap_or(defaults.backoff_base),
            backoff_multiplier: env_parse::<f64>("REQUEST_BACKOFF_MULTIPLIER")
                .filter(|m| m.is_finite() && *m >= 1.0)
                .unwrap_or(defaults.backoff_multiplier),
            max_backoff_delay: env_millis("REQUEST_MAX_BACKOFF_MS")
                .unwrap_or(defaults.max_backoff_delay),
        }
    }

    /// Backoff curve described by this config.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.backoff_base,
            self.backoff_multiplier,
            self.max_backoff_delay,
        )
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_millis(30_000),
            max_cache_entries: 1000,
            rate_window: Duration::from_millis(1000),
            max_per_window: 5,
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_backoff_delay: Duration::from_millis(10_000),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

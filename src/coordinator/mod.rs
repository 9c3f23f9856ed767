//! Request Coordinator
//!
//! Routes every outbound API call through a response cache, an in-flight
//! dedup map and a per-signature sliding-window limiter, and retries 429s
//! with exponential backoff.
//!
//! # Admission order
//! 1. Reads answered from a fresh cache entry return immediately
//! 2. A call already in flight for the same signature is joined
//! 3. A full rate window fails fast with `RateLimitExceeded`
//! 4. Otherwise a new flight is spawned and registered

mod retry;
mod stats;

#[cfg(test)]
mod tests;

pub use stats::CoordinatorStats;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::CoordinatorConfig;
use crate::error::{RequestError, Result};
use crate::limiter::RateLimiter;
use crate::models::{HttpResponse, Method, RequestDescriptor, RequestOptions, RequestSignature};
use crate::pending::{spawn_flight, PendingRequest, PendingRequests, SharedFlight};
use crate::transport::Transport;

use retry::RetryLoop;

/// Hook run when the server answers 401, e.g. to drop stored credentials.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

enum Admission {
    Cached(HttpResponse),
    Flight(SharedFlight),
}

// == Request Coordinator ==
/// Coordinates outbound requests for one application session.
///
/// Clones share the same cache, pending map and rate windows; separately
/// constructed coordinators share nothing.
#[derive(Clone)]
pub struct RequestCoordinator {
    config: Arc<CoordinatorConfig>,
    transport: Arc<dyn Transport>,
    on_unauthorized: Option<UnauthorizedHandler>,
    cache: Arc<Mutex<CacheStore>>,
    pending: Arc<Mutex<PendingRequests>>,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl RequestCoordinator {
    // == Constructors ==
    /// Creates a coordinator driving `transport` with the given configuration.
    pub fn new(config: CoordinatorConfig, transport: impl Transport) -> Self {
        let cache = CacheStore::new(config.max_cache_entries, config.cache_ttl);
        let limiter = RateLimiter::new(config.rate_window, config.max_per_window);
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            on_unauthorized: None,
            cache: Arc::new(Mutex::new(cache)),
            pending: Arc::new(Mutex::new(PendingRequests::new())),
            limiter: Arc::new(Mutex::new(limiter)),
        }
    }

    /// Creates a coordinator configured from environment variables.
    pub fn from_env(transport: impl Transport) -> Self {
        Self::new(CoordinatorConfig::from_env(), transport)
    }

    /// Installs the hook run once per 401 response.
    pub fn with_unauthorized_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // == Execute ==
    /// Performs `request`, or answers it from the cache or an identical
    /// in-flight call.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<HttpResponse> {
        let signature = request.signature();
        match self.admit(request, signature)? {
            Admission::Cached(response) => Ok(response),
            Admission::Flight(flight) => flight.await,
        }
    }

    // == Convenience Wrappers ==
    pub async fn get(&self, url: impl Into<String>, options: RequestOptions) -> Result<HttpResponse> {
        self.execute(RequestDescriptor::with_options(Method::Get, url, None, options))
            .await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: Value,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        self.execute(RequestDescriptor::with_options(Method::Post, url, Some(body), options))
            .await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: Value,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        self.execute(RequestDescriptor::with_options(Method::Put, url, Some(body), options))
            .await
    }

    pub async fn patch(
        &self,
        url: impl Into<String>,
        body: Value,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        self.execute(RequestDescriptor::with_options(Method::Patch, url, Some(body), options))
            .await
    }

    pub async fn delete(&self, url: impl Into<String>, options: RequestOptions) -> Result<HttpResponse> {
        self.execute(RequestDescriptor::with_options(Method::Delete, url, None, options))
            .await
    }

    // == Cancellation ==
    /// Cancels every in-flight call. Callers awaiting them get
    /// `RequestError::Cancelled`. The cache is left untouched.
    ///
    /// A cancelled call still counts against its rate window.
    pub fn cancel_all(&self) -> usize {
        let mut pending = lock(&self.pending);
        let signatures = pending.cancel_all();
        {
            let mut limiter = lock(&self.limiter);
            for signature in &signatures {
                limiter.record(signature);
            }
        }
        let cancelled = signatures.len();
        info!(cancelled, "cancelled all in-flight requests");
        cancelled
    }

    /// Cancels the in-flight call matching `request`, if any.
    pub fn cancel(&self, request: &RequestDescriptor) -> bool {
        let signature = request.signature();
        let mut pending = lock(&self.pending);
        let cancelled = pending.cancel(&signature);
        if cancelled {
            lock(&self.limiter).record(&signature);
            info!(%signature, "cancelled in-flight request");
        }
        cancelled
    }

    // == Cache Management ==
    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
        debug!("response cache cleared");
    }

    /// Drops the cached response for `request`. Returns true if one existed.
    pub fn invalidate(&self, request: &RequestDescriptor) -> bool {
        lock(&self.cache).remove(&request.signature())
    }

    /// Removes expired cache entries and idle rate windows.
    ///
    /// Returns `(cache_entries_removed, rate_windows_removed)`.
    pub fn purge_expired(&self) -> (usize, usize) {
        let cache_removed = lock(&self.cache).purge_expired();
        let windows_removed = lock(&self.limiter).purge_idle();
        (cache_removed, windows_removed)
    }

    // == Rate Limits ==
    /// Forgets every recorded attempt, reopening all rate windows.
    pub fn reset_rate_limits(&self) {
        lock(&self.limiter).clear();
        debug!("rate windows cleared");
    }

    // == Stats ==
    /// Read-only snapshot of the shared state.
    pub fn stats(&self) -> CoordinatorStats {
        let pending_count = lock(&self.pending).len();
        let (cached_count, cache) = {
            let cache = lock(&self.cache);
            (cache.live_len(), cache.stats())
        };
        let limited_signature_count = lock(&self.limiter).limited_count();

        CoordinatorStats {
            pending_count,
            cached_count,
            limited_signature_count,
            cache,
        }
    }

    // == Admission ==
    /// Decides how `request` is served. Runs under the pending-map lock so
    /// two callers can never both start a flight for one signature.
    fn admit(&self, request: RequestDescriptor, signature: RequestSignature) -> Result<Admission> {
        let mut pending = lock(&self.pending);

        if request.method.is_read() {
            if let Some(response) = lock(&self.cache).get(&signature) {
                debug!(%signature, "cache hit");
                return Ok(Admission::Cached(response));
            }
        }

        if let Some(flight) = pending.get(&signature) {
            debug!(%signature, "joining in-flight request");
            return Ok(Admission::Flight(flight));
        }

        {
            let mut limiter = lock(&self.limiter);
            if limiter.is_limited(&signature) {
                let retry_after = limiter.retry_after(&signature);
                warn!(%signature, ?retry_after, "rate limit exceeded");
                return Err(RequestError::RateLimitExceeded {
                    signature: signature.to_string(),
                    retry_after,
                });
            }
        }

        let id = pending.allocate_id();
        let (flight, abort) = spawn_flight(self.clone().fly(request, signature.clone(), id));
        pending.insert(
            signature,
            PendingRequest {
                id,
                flight: flight.clone(),
                abort,
            },
        );
        Ok(Admission::Flight(flight))
    }

    // == Flight ==
    /// One network flight: the retry loop plus cache bookkeeping. When this
    /// future completes or unwinds, the release guard records the attempt
    /// and frees the pending entry.
    async fn fly(
        self,
        request: RequestDescriptor,
        signature: RequestSignature,
        id: u64,
    ) -> Result<HttpResponse> {
        let _release = PendingRelease {
            pending: Arc::clone(&self.pending),
            limiter: Arc::clone(&self.limiter),
            signature: signature.clone(),
            id,
        };

        let retry = RetryLoop {
            transport: self.transport.as_ref(),
            backoff: self.config.backoff_policy(),
            max_attempts: self.config.max_retries,
            on_unauthorized: self.on_unauthorized.as_ref(),
        };
        let result = retry.run(&request, &signature).await;

        if let Ok(response) = &result {
            if request.method.is_read() && response.is_success() {
                lock(&self.cache).set(signature.clone(), response.clone());
                debug!(%signature, "response cached");
            }
        }

        result
    }
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Settles a flight when dropped: records the attempt and removes the
/// pending entry in one critical section, so no caller is admitted between
/// the two. Flights removed by `cancel`/`cancel_all` were recorded there.
struct PendingRelease {
    pending: Arc<Mutex<PendingRequests>>,
    limiter: Arc<Mutex<RateLimiter>>,
    signature: RequestSignature,
    id: u64,
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        if pending.remove_if(&self.signature, self.id) {
            lock(&self.limiter).record(&self.signature);
        }
    }
}

/// Locks a shared map. Critical sections never panic mid-update, so a
/// poisoned lock still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

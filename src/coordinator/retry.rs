//! Retry loop
//!
//! Drives one logical request through the transport, backing off on 429
//! and reporting 401 to the unauthorized handler.

use tokio::time::sleep;
use tracing::warn;

use crate::backoff::BackoffPolicy;
use crate::coordinator::UnauthorizedHandler;
use crate::error::{
    RequestError, Result, HTTP_STATUS_TOO_MANY_REQUESTS, HTTP_STATUS_UNAUTHORIZED,
};
use crate::models::{HttpResponse, RequestDescriptor, RequestSignature};
use crate::transport::Transport;

/// Retry settings for one flight.
pub(crate) struct RetryLoop<'a> {
    pub transport: &'a dyn Transport,
    pub backoff: BackoffPolicy,
    /// Total attempts allowed while the server answers 429
    pub max_attempts: u32,
    pub on_unauthorized: Option<&'a UnauthorizedHandler>,
}

impl RetryLoop<'_> {
    /// Sends `request` until it succeeds, fails for good, or runs out of attempts.
    ///
    /// - 429: sleep `backoff.compute_delay(attempt)` and try again while
    ///   attempts remain, then fail with `RetriesExhausted`
    /// - 401: run the unauthorized handler once and fail with `Unauthorized`
    /// - anything else: fail immediately with the transport error unchanged
    pub async fn run(
        &self,
        request: &RequestDescriptor,
        signature: &RequestSignature,
    ) -> Result<HttpResponse> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let err = match self.transport.send(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            match err.status {
                Some(HTTP_STATUS_TOO_MANY_REQUESTS) => {
                    if attempt + 1 >= max_attempts {
                        warn!(%signature, attempts = attempt + 1, "retries exhausted on 429");
                        return Err(RequestError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: err,
                        });
                    }
                    let delay = self.backoff.compute_delay(attempt);
                    warn!(%signature, attempt, ?delay, "server answered 429, backing off");
                    sleep(delay).await;
                    attempt += 1;
                }
                Some(HTTP_STATUS_UNAUTHORIZED) => {
                    warn!(%signature, "server answered 401");
                    if let Some(handler) = self.on_unauthorized {
                        handler();
                    }
                    return Err(RequestError::Unauthorized(err));
                }
                _ => return Err(RequestError::Transport(err)),
            }
        }
    }
}

//! Error types for the request coordinator
//!
//! Provides unified error handling using thiserror. Every error is `Clone`
//! because a single network flight can be awaited by many callers.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

// == HTTP Status Constants ==
/// Status the coordinator retries with backoff.
pub const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Status that triggers the unauthorized handler.
pub const HTTP_STATUS_UNAUTHORIZED: u16 = 401;

// == Transport Error ==
/// Failure reported by a transport.
///
/// `status` is `None` for failures that never produced an HTTP response
/// (connection refused, DNS, timeouts).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    /// HTTP status code, when the server answered
    pub status: Option<u16>,
    /// Human readable description
    pub message: String,
    /// Decoded response body, when the server sent one
    pub body: Option<Value>,
}

impl TransportError {
    /// Creates an error for a response with a non-success status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            body: None,
        }
    }

    /// Creates an error for a failure without an HTTP response.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Attaches the response body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            body: None,
        }
    }
}

// == Error Kind ==
/// Discriminant of [`RequestError`], for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimitExceeded,
    RetriesExhausted,
    Unauthorized,
    Transport,
    Cancelled,
    Internal,
}

// == Request Error Enum ==
/// Unified error type returned by the coordinator.
#[derive(Error, Debug, Clone)]
pub enum RequestError {
    /// The sliding window for this signature is full; no network call was made
    #[error("Too many requests for {signature}, retry after {retry_after:?}")]
    RateLimitExceeded {
        signature: String,
        retry_after: Duration,
    },

    /// Every attempt was answered with 429
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    /// The server answered 401; the unauthorized handler has already run
    #[error("Unauthorized: {0}")]
    Unauthorized(TransportError),

    /// Any other transport failure, unchanged
    #[error(transparent)]
    Transport(TransportError),

    /// The flight was cancelled before it settled
    #[error("Request cancelled")]
    Cancelled,

    /// The flight task failed without producing a result
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Returns the error discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            RequestError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            RequestError::Unauthorized(_) => ErrorKind::Unauthorized,
            RequestError::Transport(_) => ErrorKind::Transport,
            RequestError::Cancelled => ErrorKind::Cancelled,
            RequestError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status behind this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RequestError::RetriesExhausted { last, .. } => last.status,
            RequestError::Unauthorized(err) | RequestError::Transport(err) => err.status,
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the coordinator.
pub type Result<T> = std::result::Result<T, RequestError>;

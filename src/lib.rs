//! Request Coordinator - client-side coordination for outbound API calls
//!
//! Provides response caching with TTL and LRU eviction, in-flight request
//! deduplication, per-signature sliding-window rate limiting and retry with
//! exponential backoff on HTTP 429.

pub mod backoff;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod models;
pub mod pending;
pub mod tasks;
pub mod transport;

pub use config::CoordinatorConfig;
pub use coordinator::{CoordinatorStats, RequestCoordinator, UnauthorizedHandler};
pub use error::{ErrorKind, RequestError, TransportError};
pub use models::{HttpResponse, Method, RequestDescriptor, RequestOptions, RequestSignature};
pub use tasks::spawn_cleanup_task;
pub use transport::{ReqwestTransport, Transport};

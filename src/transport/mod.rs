//! Transport Module
//!
//! The coordinator never talks to the network itself; it drives a
//! [`Transport`] supplied by the embedding application.

mod http;

pub use http::ReqwestTransport;

use std::future::Future;

use futures::future::BoxFuture;

use crate::error::TransportError;
use crate::models::{HttpResponse, RequestDescriptor};

/// Future returned by a transport call.
pub type TransportFuture = BoxFuture<'static, Result<HttpResponse, TransportError>>;

// == Transport ==
/// Performs one HTTP call.
///
/// Non-success statuses should be reported as [`TransportError`] with
/// `status` set, otherwise 429 and 401 handling never sees them. A non-2xx
/// response returned as `Ok` is passed through to callers but never
/// cached. Dropping the returned future must cancel the call.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: RequestDescriptor) -> TransportFuture;
}

impl<F, Fut> Transport for F
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, TransportError>> + Send + 'static,
{
    fn send(&self, request: RequestDescriptor) -> TransportFuture {
        Box::pin(self(request))
    }
}

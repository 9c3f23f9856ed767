//! Pending-request map
//!
//! Tracks the in-flight network call for each signature so that concurrent
//! callers await one shared result instead of issuing their own call.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;

use crate::error::RequestError;
use crate::models::{HttpResponse, RequestSignature};

/// Outcome of one network flight, shared by every caller awaiting it.
pub type FlightResult = Result<HttpResponse, RequestError>;

/// Clonable handle on an in-flight call. All clones resolve to the same result.
pub type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;

// == Spawn Flight ==
/// Runs `work` as its own task and returns a shared handle on its result
/// plus the handle that cancels it.
///
/// The task keeps running even when no caller is polling, and an aborted
/// task resolves every handle with [`RequestError::Cancelled`].
pub fn spawn_flight<F>(work: F) -> (SharedFlight, AbortHandle)
where
    F: Future<Output = FlightResult> + Send + 'static,
{
    let handle = tokio::spawn(work);
    let abort = handle.abort_handle();
    let flight = async move {
        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(RequestError::Cancelled),
            Err(err) => Err(RequestError::Internal(err.to_string())),
        }
    }
    .boxed()
    .shared();
    (flight, abort)
}

// == Pending Request ==
/// An in-flight call registered under a signature.
pub struct PendingRequest {
    /// Distinguishes successive flights for the same signature
    pub id: u64,
    pub flight: SharedFlight,
    pub abort: AbortHandle,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("finished", &self.abort.is_finished())
            .finish()
    }
}

// == Pending Requests ==
#[derive(Debug, Default)]
pub struct PendingRequests {
    flights: HashMap<RequestSignature, PendingRequest>,
    next_id: u64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh flight id.
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // == Get Pending ==
    /// Returns a handle on the in-flight call for `signature`, if any.
    pub fn get(&self, signature: &RequestSignature) -> Option<SharedFlight> {
        self.flights
            .get(signature)
            .map(|pending| pending.flight.clone())
    }

    // == Set Pending ==
    /// Registers the in-flight call for `signature`.
    ///
    /// Callers check [`get`](Self::get) first; a flight that is somehow
    /// replaced is cancelled rather than leaked.
    pub fn insert(&mut self, signature: RequestSignature, pending: PendingRequest) {
        if let Some(previous) = self.flights.insert(signature, pending) {
            previous.abort.abort();
        }
    }

    // == Clear Pending ==
    /// Removes the entry for `signature` only if it still belongs to flight `id`.
    pub fn remove_if(&mut self, signature: &RequestSignature, id: u64) -> bool {
        match self.flights.get(signature) {
            Some(pending) if pending.id == id => {
                self.flights.remove(signature);
                true
            }
            _ => false,
        }
    }

    // == Cancel ==
    /// Aborts and forgets the flight for `signature`.
    pub fn cancel(&mut self, signature: &RequestSignature) -> bool {
        match self.flights.remove(signature) {
            Some(pending) => {
                pending.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Aborts every flight and empties the map. Returns the cancelled signatures.
    pub fn cancel_all(&mut self) -> Vec<RequestSignature> {
        self.flights
            .drain()
            .map(|(signature, pending)| {
                pending.abort.abort();
                signature
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

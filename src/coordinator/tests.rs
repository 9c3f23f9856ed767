use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{join_all, FutureExt};
use serde_json::json;
use tokio::time::{advance, sleep, Instant};
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::error::{ErrorKind, TransportError};
use crate::transport::TransportFuture;

// == Scripted Transport ==
/// Replays queued outcomes, then answers 200 echoing the URL.
#[derive(Clone, Default)]
struct ScriptedTransport {
    calls: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<std::result::Result<HttpResponse, TransportError>>>>,
    latency: Duration,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self::default()
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn then_status(self, status: u16) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TransportError::http(status, "scripted")));
        self
    }

    fn then_network_error(self) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TransportError::network("connection refused")));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: RequestDescriptor) -> TransportFuture {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.script.lock().unwrap().pop_front();
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                sleep(latency).await;
            }
            next.unwrap_or_else(|| Ok(HttpResponse::ok(json!({ "url": request.url, "call": call }))))
        }
        .boxed()
    }
}

fn coordinator(transport: &ScriptedTransport) -> RequestCoordinator {
    RequestCoordinator::new(CoordinatorConfig::default(), transport.clone())
}

fn opts() -> RequestOptions {
    RequestOptions::new()
}

// == Deduplication ==

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_reads_share_one_call() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_millis(50));
    let coordinator = coordinator(&transport);

    let results = join_all((0..8).map(|_| coordinator.get("/api/moods", opts()))).await;

    assert_eq!(transport.calls(), 1);
    let first = assert_ok!(results[0].clone());
    for result in results {
        assert_eq!(assert_ok!(result), first);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_mutations_share_one_call() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_millis(50));
    let coordinator = coordinator(&transport);

    let results = join_all(
        (0..3).map(|_| coordinator.post("/api/moods", json!({"mood": 4}), opts())),
    )
    .await;

    assert_eq!(transport.calls(), 1);
    assert!(results.iter().all(|r| r.is_ok()));
}

#[tokio::test(start_paused = true)]
async fn test_different_signatures_fly_independently() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_millis(50));
    let coordinator = coordinator(&transport);

    let (moods, assessments) = tokio::join!(
        coordinator.get("/api/moods", opts()),
        coordinator.get("/api/assessments", opts()),
    );

    assert_ok!(moods);
    assert_ok!(assessments);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pending_entry_released_after_settle() {
    let transport = ScriptedTransport::new().then_status(500);
    let coordinator = coordinator(&transport);

    assert_err!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(coordinator.stats().pending_count, 0);
}

// == Caching ==

#[tokio::test(start_paused = true)]
async fn test_read_cached_within_ttl() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    let first = assert_ok!(coordinator.get("/api/moods", opts()).await);
    let second = assert_ok!(coordinator.get("/api/moods", opts()).await);

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
    assert_eq!(coordinator.stats().cached_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_expires_after_ttl() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    advance(Duration::from_millis(29_999)).await;
    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(transport.calls(), 1);

    advance(Duration::from_millis(1)).await;
    let refreshed = assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(transport.calls(), 2);
    assert_eq!(refreshed.body["call"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_mutations_are_not_cached() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.post("/api/moods", json!({"mood": 2}), opts()).await);
    assert_ok!(coordinator.post("/api/moods", json!({"mood": 2}), opts()).await);

    assert_eq!(transport.calls(), 2);
    assert_eq!(coordinator.stats().cached_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_errors_are_not_cached() {
    let transport = ScriptedTransport::new().then_status(503);
    let coordinator = coordinator(&transport);

    assert_err!(coordinator.get("/api/moods", opts()).await);
    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_forces_refetch() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_ok!(coordinator.get("/api/profile", opts()).await);
    coordinator.clear_cache();

    assert_eq!(coordinator.stats().cached_count, 0);
    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_single_signature() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_ok!(coordinator.get("/api/profile", opts()).await);

    assert!(coordinator.invalidate(&RequestDescriptor::get("/api/moods")));
    assert!(!coordinator.invalidate(&RequestDescriptor::get("/api/moods")));

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_ok!(coordinator.get("/api/profile", opts()).await);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ttl_disables_cache() {
    let transport = ScriptedTransport::new();
    let config = CoordinatorConfig {
        cache_ttl: Duration::ZERO,
        ..CoordinatorConfig::default()
    };
    let coordinator = RequestCoordinator::new(config, transport.clone());

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(transport.calls(), 2);
}

// == Rate Limiting ==

#[tokio::test(start_paused = true)]
async fn test_rate_limit_rejects_locally() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);
    let body = json!({"answers": [1, 2, 3]});

    for _ in 0..5 {
        assert_ok!(coordinator.post("/api/assessments", body.clone(), opts()).await);
    }
    let err = assert_err!(coordinator.post("/api/assessments", body.clone(), opts()).await);

    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    match err {
        RequestError::RateLimitExceeded { retry_after, .. } => {
            assert_eq!(retry_after, Duration::from_millis(1000));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls(), 5);
    assert_eq!(coordinator.stats().limited_signature_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_window_slides() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);
    let body = json!({"mood": 5});

    for _ in 0..5 {
        assert_ok!(coordinator.post("/api/moods", body.clone(), opts()).await);
    }
    assert_err!(coordinator.post("/api/moods", body.clone(), opts()).await);

    advance(Duration::from_millis(1001)).await;
    assert_ok!(coordinator.post("/api/moods", body.clone(), opts()).await);
    assert_eq!(transport.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempts_count_against_window() {
    let transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.script.lock().unwrap().push_back(Err(TransportError::http(500, "boom")));
    }
    let coordinator = coordinator(&transport);

    for _ in 0..5 {
        let err = assert_err!(coordinator.delete("/api/moods/1", opts()).await);
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
    let err = assert_err!(coordinator.delete("/api/moods/1", opts()).await);
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert_eq!(transport.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hits_do_not_count_against_window() {
    let transport = ScriptedTransport::new();
    let config = CoordinatorConfig {
        max_per_window: 1,
        ..CoordinatorConfig::default()
    };
    let coordinator = RequestCoordinator::new(config, transport.clone());

    for _ in 0..10 {
        assert_ok!(coordinator.get("/api/moods", opts()).await);
    }
    assert_eq!(transport.calls(), 1);
}

// == Retries ==

#[tokio::test(start_paused = true)]
async fn test_retries_429_then_succeeds() {
    let transport = ScriptedTransport::new().then_status(429).then_status(429);
    let coordinator = coordinator(&transport);
    let started = Instant::now();

    let response = assert_ok!(coordinator.get("/api/moods", opts()).await);

    assert_eq!(response.status, 200);
    assert_eq!(transport.calls(), 3);
    // 1s then 2s of backoff, each with up to 10% jitter and ms timer rounding
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(3), "waited {waited:?}");
    assert!(waited <= Duration::from_millis(3320), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_after_max_attempts() {
    let transport = ScriptedTransport::new()
        .then_status(429)
        .then_status(429)
        .then_status(429);
    let coordinator = coordinator(&transport);

    let err = assert_err!(coordinator.get("/api/moods", opts()).await);

    // the fourth call, which would succeed, is never made
    assert_eq!(transport.calls(), 3);
    match err {
        RequestError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.status, Some(429));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_max_retries_makes_one_attempt() {
    let transport = ScriptedTransport::new().then_status(429);
    let config = CoordinatorConfig {
        max_retries: 0,
        ..CoordinatorConfig::default()
    };
    let coordinator = RequestCoordinator::new(config, transport.clone());

    let err = assert_err!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_statuses_are_not_retried() {
    let transport = ScriptedTransport::new().then_status(500);
    let coordinator = coordinator(&transport);

    let err = assert_err!(coordinator.get("/api/moods", opts()).await);

    assert_eq!(transport.calls(), 1);
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.http_status(), Some(500));
}

#[tokio::test(start_paused = true)]
async fn test_network_errors_propagate_unchanged() {
    let transport = ScriptedTransport::new().then_network_error();
    let coordinator = coordinator(&transport);

    let err = assert_err!(coordinator.get("/api/moods", opts()).await);

    assert_eq!(transport.calls(), 1);
    match err {
        RequestError::Transport(inner) => {
            assert_eq!(inner, TransportError::network("connection refused"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// == Unauthorized ==

#[tokio::test(start_paused = true)]
async fn test_unauthorized_runs_hook_once() {
    let transport = ScriptedTransport::new().then_status(401);
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let counter = hook_calls.clone();
    let coordinator = coordinator(&transport).with_unauthorized_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let err = assert_err!(coordinator.get("/api/profile", opts()).await);

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.http_status(), Some(401));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_hook_once_for_deduplicated_callers() {
    let transport = ScriptedTransport::new()
        .with_latency(Duration::from_millis(20))
        .then_status(401);
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let counter = hook_calls.clone();
    let coordinator = coordinator(&transport).with_unauthorized_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let results = join_all((0..4).map(|_| coordinator.get("/api/profile", opts()))).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(RequestError::Unauthorized(_)))));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_without_hook() {
    let transport = ScriptedTransport::new().then_status(401);
    let coordinator = coordinator(&transport);

    let err = assert_err!(coordinator.get("/api/profile", opts()).await);
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

// == Cancellation ==

async fn wait_for_pending(coordinator: &RequestCoordinator, expected: usize) {
    for _ in 0..100 {
        if coordinator.stats().pending_count == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {expected} pending requests");
}

#[tokio::test]
async fn test_cancel_all_rejects_waiting_callers() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_secs(60));
    let coordinator = coordinator(&transport);

    let moods = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get("/api/moods", RequestOptions::new()).await }
    });
    let profile = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get("/api/profile", RequestOptions::new()).await }
    });
    wait_for_pending(&coordinator, 2).await;

    assert_eq!(coordinator.cancel_all(), 2);
    assert_eq!(coordinator.stats().pending_count, 0);

    let moods = moods.await.unwrap();
    let profile = profile.await.unwrap();
    assert!(matches!(moods, Err(RequestError::Cancelled)));
    assert!(matches!(profile, Err(RequestError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_single_signature() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_millis(100));
    let coordinator = coordinator(&transport);

    let moods = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get("/api/moods", RequestOptions::new()).await }
    });
    let profile = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get("/api/profile", RequestOptions::new()).await }
    });
    wait_for_pending(&coordinator, 2).await;

    assert!(coordinator.cancel(&RequestDescriptor::get("/api/moods")));
    assert!(matches!(moods.await.unwrap(), Err(RequestError::Cancelled)));
    assert_ok!(profile.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_new_flight_after_cancel() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_secs(5));
    let coordinator = coordinator(&transport);

    let stale = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get("/api/moods", RequestOptions::new()).await }
    });
    wait_for_pending(&coordinator, 1).await;
    coordinator.cancel_all();
    assert!(matches!(stale.await.unwrap(), Err(RequestError::Cancelled)));

    let fresh = assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(fresh.status, 200);
    assert_eq!(coordinator.stats().pending_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_keeps_cache() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_eq!(coordinator.cancel_all(), 0);
    assert_eq!(coordinator.stats().cached_count, 1);
}

// == Instances & Housekeeping ==

#[tokio::test(start_paused = true)]
async fn test_instances_are_independent() {
    let transport = ScriptedTransport::new();
    let first = coordinator(&transport);
    let second = coordinator(&transport);

    assert_ok!(first.get("/api/moods", opts()).await);
    assert_ok!(second.get("/api/moods", opts()).await);

    assert_eq!(transport.calls(), 2);
    assert_eq!(first.stats().cached_count, 1);
    assert_eq!(second.stats().cached_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_purge_expired() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    advance(Duration::from_secs(31)).await;

    assert_eq!(coordinator.purge_expired(), (1, 1));
    let stats = coordinator.stats();
    assert_eq!(stats.cache.total_entries, 0);
    assert_eq!(stats.limited_signature_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stats_counts_cache_activity() {
    let transport = ScriptedTransport::new();
    let coordinator = coordinator(&transport);

    assert_ok!(coordinator.get("/api/moods", opts()).await);
    assert_ok!(coordinator.get("/api/moods", opts()).await);

    let stats = coordinator.stats();
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache.misses, 1);
    assert_eq!(stats.pending_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_flights_count_against_window() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_secs(60));
    let coordinator = coordinator(&transport);
    let body = json!({"mood": 3});

    for _ in 0..5 {
        let caller = tokio::spawn({
            let coordinator = coordinator.clone();
            let body = body.clone();
            async move { coordinator.post("/api/moods", body, RequestOptions::new()).await }
        });
        wait_for_pending(&coordinator, 1).await;
        assert_eq!(coordinator.cancel_all(), 1);
        assert!(matches!(caller.await.unwrap(), Err(RequestError::Cancelled)));
    }

    let err = assert_err!(coordinator.post("/api/moods", body.clone(), opts()).await);
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert!(transport.calls() <= 5);
}

#[tokio::test(start_paused = true)]
async fn test_single_cancel_counts_against_window() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_secs(60));
    let config = CoordinatorConfig {
        max_per_window: 1,
        ..CoordinatorConfig::default()
    };
    let coordinator = RequestCoordinator::new(config, transport.clone());

    let caller = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.delete("/api/moods/7", RequestOptions::new()).await }
    });
    wait_for_pending(&coordinator, 1).await;
    assert!(coordinator.cancel(&RequestDescriptor::new(Method::Delete, "/api/moods/7")));
    assert!(matches!(caller.await.unwrap(), Err(RequestError::Cancelled)));

    let err = assert_err!(coordinator.delete("/api/moods/7", opts()).await);
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
}

#[tokio::test(start_paused = true)]
async fn test_reset_rate_limits_reopens_windows() {
    let transport = ScriptedTransport::new();
    let config = CoordinatorConfig {
        max_per_window: 1,
        ..CoordinatorConfig::default()
    };
    let coordinator = RequestCoordinator::new(config, transport.clone());
    let body = json!({"answers": [2, 2]});

    assert_ok!(coordinator.post("/api/assessments", body.clone(), opts()).await);
    assert_err!(coordinator.post("/api/assessments", body.clone(), opts()).await);
    assert_eq!(coordinator.stats().limited_signature_count, 1);

    coordinator.reset_rate_limits();

    assert_eq!(coordinator.stats().limited_signature_count, 0);
    assert_ok!(coordinator.post("/api/assessments", body.clone(), opts()).await);
    assert_eq!(transport.calls(), 2);
}

// == Non-success Responses ==

#[tokio::test(start_paused = true)]
async fn test_non_success_ok_response_is_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let transport = move |_: RequestDescriptor| {
        counter.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok::<_, TransportError>(HttpResponse::new(503, json!("down"))))
    };
    let coordinator = RequestCoordinator::new(CoordinatorConfig::default(), transport);

    let first = assert_ok!(coordinator.get("/api/moods", opts()).await);
    let second = assert_ok!(coordinator.get("/api/moods", opts()).await);

    assert_eq!(first.status, 503);
    assert_eq!(second.status, 503);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.stats().cached_count, 0);
}

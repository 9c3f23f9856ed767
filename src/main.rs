//! Request Coordinator probe
//!
//! Issues a GET for every URL given on the command line through one
//! coordinator, so duplicate URLs share a single flight, then prints each
//! outcome and a stats report.

use std::env;

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use request_coordinator::{CoordinatorConfig, RequestCoordinator, RequestOptions, ReqwestTransport};

/// Main entry point for the coordinator probe.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the reqwest transport, resolving against `REQUEST_BASE_URL`
/// 4. Fire one GET per argument concurrently
/// 5. Print outcomes and a JSON stats report
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_coordinator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let urls: Vec<String> = env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: request-coordinator <url>...");
    }

    let config = CoordinatorConfig::from_env();
    info!(
        "Configuration loaded: cache_ttl={:?}, rate_window={:?}, max_per_window={}, max_retries={}",
        config.cache_ttl, config.rate_window, config.max_per_window, config.max_retries
    );

    let mut transport = ReqwestTransport::new(reqwest::Client::new());
    if let Ok(base_url) = env::var("REQUEST_BASE_URL") {
        info!("Resolving relative URLs against {}", base_url);
        transport = transport.with_base_url(base_url);
    }
    let coordinator = RequestCoordinator::new(config, transport);

    let outcomes = join_all(
        urls.iter()
            .map(|url| coordinator.get(url.as_str(), RequestOptions::new())),
    )
    .await;

    for (url, outcome) in urls.iter().zip(outcomes) {
        match outcome {
            Ok(response) => println!("{url} -> {} {}", response.status, response.body),
            Err(err) => println!("{url} -> error ({:?}): {err}", err.kind()),
        }
    }

    let report = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "stats": coordinator.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

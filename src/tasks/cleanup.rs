//! Cleanup Task
//!
//! Expired cache entries are evicted lazily on lookup and rate windows are
//! pruned on every check, so nothing here is needed for correctness. This
//! task just keeps memory flat when many signatures are touched once and
//! never again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::coordinator::RequestCoordinator;

/// Spawns a task that calls [`RequestCoordinator::purge_expired`] every
/// `interval`.
///
/// The returned handle aborts the task; dropping it leaves the task running.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(coordinator.clone(), Duration::from_secs(60));
/// // on shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(coordinator: RequestCoordinator, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "starting coordinator cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let (cache_removed, windows_removed) = coordinator.purge_expired();
            if cache_removed > 0 || windows_removed > 0 {
                info!(cache_removed, windows_removed, "cleanup purged stale state");
            } else {
                debug!("cleanup: nothing to purge");
            }
        }
    })
}

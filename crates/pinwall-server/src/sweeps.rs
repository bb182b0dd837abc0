use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pinwall_api::auth::AppState;
use pinwall_core::cache::MemoryCache;

/// Background task that prunes expired state.
///
/// Runs on an interval and drops presence sessions whose heartbeat went
/// stale, cache entries past their TTL, and rate-limit windows that have
/// closed. Reads already filter stale rows on their own; the sweep only
/// keeps the tables and maps from growing.
pub async fn run_sweep_loop(state: AppState, cache: Arc<MemoryCache>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.membership.sweep_sessions() {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: dropped {} stale presence sessions", count);
                }
            }
            Err(e) => {
                warn!("Session sweep error: {}", e);
            }
        }

        let entries = cache.sweep();
        if entries > 0 {
            info!("Sweep: evicted {} expired cache entries", entries);
        }

        let windows = state.limiter.sweep();
        if windows > 0 {
            info!("Sweep: dropped {} expired rate-limit windows", windows);
        }
    }
}

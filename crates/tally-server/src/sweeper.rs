//! Background sweeper for expired pending matches
//!
//! Expired entries are already invisible to readers; the sweeper only
//! reclaims their memory. Configured via `TALLY_PENDING_SWEEP_SECS`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info};

use crate::AppState;

/// Start the sweeper as a background task
///
/// This function spawns a tokio task that runs for the lifetime of the
/// server, evicting expired pending matches at the configured interval.
pub fn start_pending_sweeper(state: Arc<AppState>, every: Duration) {
    info!(
        "Starting pending sweeper: every {}s, TTL {}s",
        every.as_secs(),
        state.pending.ttl().as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));

        // Skip the first immediate tick - nothing can have expired yet
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let evicted = state.pending.evict_expired();
            if evicted > 0 {
                info!("Dropped {} expired pending match(es)", evicted);
            } else {
                debug!("Pending sweep: nothing expired");
            }
        }
    });
}

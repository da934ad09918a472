//! Background rate-limit sweep
//!
//! Records whose window has passed are dropped on a fixed interval so the
//! limiter's memory tracks active senders only. Checks already reset stale
//! windows lazily; the sweep only reclaims memory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use spendly_core::rate_limit::RateLimiter;

/// Start the sweeper as a background task
///
/// The first tick is skipped: there is nothing to sweep at startup.
pub fn start_rate_limit_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    info!("Starting rate limit sweep every {}s", every.as_secs());

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep(Utc::now());
            debug!(removed, tracked = limiter.len(), "Rate limit sweep complete");
        }
    })
}

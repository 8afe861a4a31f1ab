//! Periodic source reachability probe.
//!
//! The probe only logs and records metrics; it never affects pairings or the
//! accept loop.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sockrelay_metrics::record_health_check;

use crate::endpoint::SourceEndpoint;
use crate::engine::RelayConfig;
use crate::error::RelayError;

/// Dial `source` once and close the connection right away.
pub async fn check_source(
    source: &SourceEndpoint,
    shutdown: &CancellationToken,
) -> Result<(), RelayError> {
    let mut stream = source.dial(shutdown).await?;
    let _ = stream.shutdown().await;
    Ok(())
}

/// Probe the source every `health_check_interval` until `shutdown` fires.
///
/// The first probe runs one interval after start.
pub(crate) async fn run_health_check(config: Arc<RelayConfig>, shutdown: CancellationToken) {
    let period = config.health_check_interval;
    let Some(start) = Instant::now().checked_add(period) else {
        warn!(
            interval = ?period,
            "health check interval out of range, health checks disabled"
        );
        shutdown.cancelled().await;
        return;
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match check_source(&config.source, &shutdown).await {
            Ok(()) => {
                debug!(source_name = config.source_name, "source reachable");
                record_health_check(true);
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                warn!(
                    source_name = config.source_name,
                    address = %config.source,
                    error = %e,
                    "health check failed"
                );
                record_health_check(false);
            }
        }
    }
    debug!("health check stopped");
}

//! One accepted client paired with one freshly dialed source connection.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sockrelay_core::io::{DeadlineStream, RelayEnd, RelayMetrics, relay_bidirectional};
use sockrelay_metrics::{
    record_bytes_inbound, record_bytes_outbound, record_connection_closed, record_error,
};

use crate::endpoint::RelayStream;
use crate::engine::RelayConfig;

/// Feeds relay byte counts into the process metrics.
struct PairingMetrics;

impl RelayMetrics for PairingMetrics {
    fn record_inbound(&self, bytes: u64) {
        record_bytes_inbound(bytes);
    }

    fn record_outbound(&self, bytes: u64) {
        record_bytes_outbound(bytes);
    }
}

/// Serve one client until either side closes, an I/O call fails, or
/// `shutdown` fires.
///
/// A source dial failure only affects this client; both connections are
/// always closed before returning.
pub(crate) async fn handle_pairing(
    mut client: RelayStream,
    config: Arc<RelayConfig>,
    shutdown: CancellationToken,
) {
    let start = Instant::now();

    let source = match config.source.dial(&shutdown).await {
        Ok(stream) => stream,
        Err(e) if e.is_cancelled() => {
            debug!("shutdown before source was dialed");
            let _ = client.shutdown().await;
            record_connection_closed(start.elapsed().as_secs_f64());
            return;
        }
        Err(e) => {
            warn!(
                source_name = config.source_name,
                address = %config.source,
                error = %e,
                "failed to connect to source"
            );
            record_error(e.error_type());
            let _ = client.shutdown().await;
            record_connection_closed(start.elapsed().as_secs_f64());
            return;
        }
    };

    let mut inbound = DeadlineStream::new(client, config.io_timeout, config.io_timeout);
    let mut outbound = DeadlineStream::new(source, config.io_timeout, config.io_timeout);

    let result = relay_bidirectional(
        &mut inbound,
        &mut outbound,
        config.buffer_size,
        &shutdown,
        &PairingMetrics,
    )
    .await;

    // Close failures are expected here, the peer has usually gone already.
    let _ = inbound.close().await;
    let _ = outbound.close().await;

    let duration = start.elapsed();
    match result {
        Ok(stats) => {
            let end = match stats.end {
                RelayEnd::InboundClosed => "client closed",
                RelayEnd::OutboundClosed => "source closed",
                RelayEnd::Cancelled => "shutdown",
            };
            debug!(
                inbound_bytes = stats.inbound_bytes,
                outbound_bytes = stats.outbound_bytes,
                duration_ms = duration.as_millis() as u64,
                end,
                "pairing closed"
            );
        }
        Err(e) => {
            let err = crate::error::RelayError::from(e);
            debug!(
                error = %err,
                duration_ms = duration.as_millis() as u64,
                "pairing ended with error"
            );
            record_error(err.error_type());
        }
    }
    record_connection_closed(duration.as_secs_f64());
}

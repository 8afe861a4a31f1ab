//! Metrics collection and Prometheus exporter for sockrelay.
//!
//! Recording goes through the `metrics` facade, so every function here is a
//! cheap no-op until an exporter is installed with [`init_prometheus`].

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter.
///
/// Starts an HTTP server on the given address to expose metrics.
/// Returns an error message if binding fails.
pub fn init_prometheus(listen: &str) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid metrics listen address: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;

    Ok(())
}

// ============================================================================
// Metric Names
// ============================================================================

/// Total number of client connections accepted on the destination listener.
pub const CONNECTIONS_TOTAL: &str = "sockrelay_connections_total";
/// Number of currently active pairings.
pub const CONNECTIONS_ACTIVE: &str = "sockrelay_connections_active";
/// Total number of clients closed by the admission gate.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "sockrelay_connections_rejected_total";
/// Total bytes copied from clients to the source.
pub const BYTES_INBOUND_TOTAL: &str = "sockrelay_bytes_inbound_total";
/// Total bytes copied from the source to clients.
pub const BYTES_OUTBOUND_TOTAL: &str = "sockrelay_bytes_outbound_total";
/// Pairing lifetime histogram (seconds).
pub const PAIRING_DURATION_SECONDS: &str = "sockrelay_pairing_duration_seconds";
/// Total number of health checks by result.
pub const HEALTH_CHECKS_TOTAL: &str = "sockrelay_health_checks_total";
/// Whether the last health check reached the source (1 or 0).
pub const SOURCE_UP: &str = "sockrelay_source_up";
/// Total number of errors by type.
pub const ERRORS_TOTAL: &str = "sockrelay_errors_total";

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a new client connection accepted.
#[inline]
pub fn record_connection_accepted() {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a pairing closed.
#[inline]
pub fn record_connection_closed(duration_secs: f64) {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(PAIRING_DURATION_SECONDS).record(duration_secs);
}

/// Record a rejected connection (reason: "max_connections").
#[inline]
pub fn record_connection_rejected(reason: &'static str) {
    counter!(CONNECTIONS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Record bytes copied client -> source.
#[inline]
pub fn record_bytes_inbound(bytes: u64) {
    counter!(BYTES_INBOUND_TOTAL).increment(bytes);
}

/// Record bytes copied source -> client.
#[inline]
pub fn record_bytes_outbound(bytes: u64) {
    counter!(BYTES_OUTBOUND_TOTAL).increment(bytes);
}

/// Record the outcome of one health check.
#[inline]
pub fn record_health_check(up: bool) {
    let result = if up { "up" } else { "down" };
    counter!(HEALTH_CHECKS_TOTAL, "result" => result).increment(1);
    gauge!(SOURCE_UP).set(if up { 1.0 } else { 0.0 });
}

/// Record an error by type.
#[inline]
pub fn record_error(error_type: &'static str) {
    counter!(ERRORS_TOTAL, "type" => error_type).increment(1);
}

// ============================================================================
// Error Type Constants (re-exported from sockrelay-core)
// ============================================================================

pub use sockrelay_core::{
    ERROR_ACCEPT, ERROR_CANCELLED, ERROR_CONFIG, ERROR_DIAL, ERROR_IO, ERROR_LISTEN, ERROR_TIMEOUT,
};

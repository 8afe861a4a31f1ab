//! Error type constants for metrics and logging.
//!
//! These constants provide consistent error classification across all crates.

/// I/O error while relaying.
pub const ERROR_IO: &str = "io";
/// Read or write deadline expired.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Configuration or address validation error.
pub const ERROR_CONFIG: &str = "config";
/// Source endpoint could not be dialed.
pub const ERROR_DIAL: &str = "dial";
/// Destination endpoint could not be bound.
pub const ERROR_LISTEN: &str = "listen";
/// Listener failed to accept a client.
pub const ERROR_ACCEPT: &str = "accept";
/// Operation abandoned because shutdown was requested.
pub const ERROR_CANCELLED: &str = "cancelled";

//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Relay Defaults
// ============================================================================

/// Default bytes per copy chunk (16 KiB, the usual Linux socket buffer size).
pub const DEFAULT_BUFFER_SIZE: usize = 16384;
/// Default interval between source health checks in seconds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
/// Default read/write deadline for relayed connections in seconds.
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;
/// Default time to wait for active pairings after the accept loop stops.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;
/// Largest accepted copy chunk (16 MiB); one is allocated per direction.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;
/// Largest accepted interval or timeout setting, in seconds (7 days).
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 3600;

// ============================================================================
// Accept Loop Defaults
// ============================================================================

/// Initial delay after a failed accept, in milliseconds.
pub const DEFAULT_ACCEPT_BACKOFF_MIN_MS: u64 = 5;
/// Upper bound for the accept backoff, in milliseconds.
pub const DEFAULT_ACCEPT_BACKOFF_MAX_MS: u64 = 1000;

// ============================================================================
// TCP Socket Defaults
// ============================================================================

/// TCP keep-alive period applied to dialed source connections, in seconds.
pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 15;
/// Default TCP_NODELAY on dialed source connections.
pub const DEFAULT_TCP_NO_DELAY: bool = true;
/// Default TCP listener backlog.
pub const DEFAULT_CONNECTION_BACKLOG: u32 = 1024;

// ============================================================================
// Fake Server Defaults
// ============================================================================

/// Socket path used by the `fake` subcommand.
pub const DEFAULT_FAKE_SOCKET_PATH: &str = "./test.sock";
/// Message the fake server writes to each client.
pub const FAKE_GREETING: &[u8] = b"MOSHI MOSHI";
/// Interval between fake server writes, in seconds.
pub const FAKE_GREETING_INTERVAL_SECS: u64 = 1;

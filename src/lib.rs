//! # sockrelay
//!
//! Duplex byte-stream relay between TCP and Unix domain sockets.
//!
//! ## Crates
//!
//! - [`sockrelay_core`] - Defaults, error constants and I/O primitives
//! - [`sockrelay_metrics`] - Prometheus-compatible metrics
//! - [`sockrelay_relay`] - Relay engine, directions and CLI

pub use sockrelay_core as core;
pub use sockrelay_metrics as metrics;
pub use sockrelay_relay as relay;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sockrelay_relay::{
        CancellationToken, DuplexRelay, RelayError, RelaySettings, tcp_to_tcp, tcp_to_unix,
        unix_to_tcp,
    };
}

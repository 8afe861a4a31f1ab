//! Duplex byte-stream relay between TCP and Unix domain sockets.
//!
//! A relay listens on a destination endpoint and, for every accepted client,
//! dials a fresh connection to a source endpoint and copies bytes both ways
//! until either side closes:
//!
//! `client → destination listener → relay → source`
//!
//! # Directions
//!
//! - [`tcp_to_tcp`]: TCP source, TCP destination
//! - [`tcp_to_unix`]: TCP source, Unix socket destination
//! - [`unix_to_tcp`]: Unix socket source, TCP destination
//!
//! All directions share the same engine ([`DuplexRelay`]) and differ only in
//! the dial and listen strategies they select. The engine is driven by a
//! [`CancellationToken`]; cancelling it stops the accept loop, the health
//! check and every active pairing.

pub mod cli;
pub mod config;
pub mod direction;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod fake;
pub mod health;
mod pairing;
pub mod tracker;

pub use config::{RelayFile, RelayOverrides, RelaySettings, resolve_settings};
pub use direction::{tcp_to_tcp, tcp_to_unix, unix_to_tcp};
pub use endpoint::{DestinationEndpoint, SourceEndpoint, TcpAddress, remove_socket_file};
pub use engine::{BoundRelay, DuplexRelay, RelayConfig};
pub use error::RelayError;
pub use health::check_source;
pub use tokio_util::sync::CancellationToken;

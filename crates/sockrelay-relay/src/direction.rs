//! The three relay directions.
//!
//! Each constructor validates its inputs, then picks one dial strategy and
//! one listen strategy for [`DuplexRelay`]. No socket is touched here except
//! the existence check on a Unix source path.

use std::path::PathBuf;
use std::time::Duration;

use sockrelay_core::defaults::DEFAULT_TCP_KEEPALIVE_SECS;

use crate::config::{RelaySettings, validate_settings};
use crate::endpoint::{DestinationEndpoint, SourceEndpoint, TcpAddress};
use crate::engine::{DuplexRelay, RelayConfig};
use crate::error::RelayError;

const TCP_NAME: &str = "TCP connection";
const UNIX_NAME: &str = "unix socket";

fn tcp_source(addr: TcpAddress) -> SourceEndpoint {
    SourceEndpoint::Tcp {
        addr,
        keepalive: Duration::from_secs(DEFAULT_TCP_KEEPALIVE_SECS),
    }
}

fn build(
    settings: &RelaySettings,
    source_name: &'static str,
    destination_name: &'static str,
    source: SourceEndpoint,
    destination: DestinationEndpoint,
) -> DuplexRelay {
    DuplexRelay::new(RelayConfig {
        buffer_size: settings.buffer_size,
        health_check_interval: settings.health_check_interval,
        io_timeout: settings.io_timeout,
        drain_timeout: settings.drain_timeout,
        max_connections: settings.max_connections,
        source_name,
        destination_name,
        source,
        destination,
    })
}

/// Listen on TCP `dst` and relay every client to TCP `src`.
pub fn tcp_to_tcp(
    src: &str,
    dst: &str,
    settings: &RelaySettings,
) -> Result<DuplexRelay, RelayError> {
    validate_settings(settings)?;
    let src = TcpAddress::parse(src)?;
    let dst = TcpAddress::parse(dst)?;

    Ok(build(
        settings,
        "source TCP connection",
        "destination TCP connection",
        tcp_source(src),
        DestinationEndpoint::Tcp { addr: dst },
    ))
}

/// Listen on the Unix socket `dst` and relay every client to TCP `src`.
///
/// The socket file at `dst` is created by the listener; removing it after the
/// relay stops is up to the caller.
pub fn tcp_to_unix(
    src: &str,
    dst: impl Into<PathBuf>,
    settings: &RelaySettings,
) -> Result<DuplexRelay, RelayError> {
    validate_settings(settings)?;
    let src = TcpAddress::parse(src)?;

    Ok(build(
        settings,
        TCP_NAME,
        UNIX_NAME,
        tcp_source(src),
        DestinationEndpoint::Unix { path: dst.into() },
    ))
}

/// Listen on TCP `dst` and relay every client to the Unix socket `src`.
///
/// Fails if nothing exists at `src` yet.
pub fn unix_to_tcp(
    src: impl Into<PathBuf>,
    dst: &str,
    settings: &RelaySettings,
) -> Result<DuplexRelay, RelayError> {
    validate_settings(settings)?;
    let src = src.into();
    std::fs::metadata(&src).map_err(|source| RelayError::SourceMissing {
        path: src.clone(),
        source,
    })?;
    let dst = TcpAddress::parse(dst)?;

    Ok(build(
        settings,
        UNIX_NAME,
        TCP_NAME,
        SourceEndpoint::Unix { path: src },
        DestinationEndpoint::Tcp { addr: dst },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_to_tcp_names_and_keepalive() {
        let relay = tcp_to_tcp("127.0.0.1:9000", ":9001", &RelaySettings::default()).unwrap();
        let cfg = relay.config();
        assert_eq!(cfg.source_name, "source TCP connection");
        assert_eq!(cfg.destination_name, "destination TCP connection");
        assert_eq!(cfg.buffer_size, 16384);
        assert_eq!(cfg.health_check_interval, Duration::from_secs(30));
        match &cfg.source {
            SourceEndpoint::Tcp { keepalive, .. } => {
                assert_eq!(*keepalive, Duration::from_secs(15))
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(cfg.destination.to_string(), ":9001");
    }

    #[test]
    fn test_tcp_to_tcp_validates_both_sides() {
        let settings = RelaySettings::default();
        assert!(matches!(
            tcp_to_tcp("localhost", "127.0.0.1:1", &settings),
            Err(RelayError::InvalidAddress(_))
        ));
        assert!(matches!(
            tcp_to_tcp("127.0.0.1:1", "127.0.0.1:port", &settings),
            Err(RelayError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_tcp_to_unix() {
        let relay =
            tcp_to_unix("127.0.0.1:9000", "/tmp/relay.sock", &RelaySettings::default()).unwrap();
        let cfg = relay.config();
        assert_eq!(cfg.source_name, "TCP connection");
        assert_eq!(cfg.destination_name, "unix socket");
        assert_eq!(
            cfg.destination.socket_path(),
            Some(&PathBuf::from("/tmp/relay.sock"))
        );

        let err = tcp_to_unix("127.0.0.1", "/tmp/relay.sock", &RelaySettings::default())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "wrong format for tcp address 127.0.0.1. Expected <addr>:<port>"
        );
    }

    #[test]
    fn test_unix_to_tcp_requires_existing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sock");
        let err = unix_to_tcp(&missing, "127.0.0.1:9000", &RelaySettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::SourceMissing { .. }));

        let present = dir.path().join("present.sock");
        std::fs::write(&present, b"").unwrap();
        let relay = unix_to_tcp(&present, "127.0.0.1:9000", &RelaySettings::default()).unwrap();
        assert_eq!(relay.config().source_name, "unix socket");
        assert_eq!(relay.config().destination_name, "TCP connection");
        assert!(relay.config().destination.socket_path().is_none());
    }

    #[test]
    fn test_unix_to_tcp_validates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.sock");
        std::fs::write(&present, b"").unwrap();

        let err = unix_to_tcp(&present, "127.0.0.1:99999", &RelaySettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::InvalidPort { .. }));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = RelaySettings {
            buffer_size: 0,
            ..RelaySettings::default()
        };
        let err = tcp_to_tcp("127.0.0.1:1", "127.0.0.1:2", &settings)
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::Config(_)));
    }
}

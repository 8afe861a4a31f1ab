//! TCP dialing and listening.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};

use sockrelay_core::defaults::DEFAULT_TCP_NO_DELAY;

use crate::error::RelayError;

/// A validated `host:port` address.
///
/// The host may be empty (`:8080`), meaning all interfaces when listening
/// and the loopback interface when dialing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpAddress {
    host: String,
    port: u16,
}

impl TcpAddress {
    /// Validate `addr` as exactly one host and one numeric port.
    pub fn parse(addr: &str) -> Result<Self, RelayError> {
        let parts: Vec<&str> = addr.split(':').collect();
        let [host, port] = parts.as_slice() else {
            return Err(RelayError::InvalidAddress(addr.to_string()));
        };
        let port = port.parse::<u16>().map_err(|source| RelayError::InvalidPort {
            port: (*port).to_string(),
            source,
        })?;
        Ok(Self {
            host: (*host).to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn dial_target(&self) -> String {
        let host = if self.host.is_empty() { "127.0.0.1" } else { &self.host };
        format!("{host}:{}", self.port)
    }

    fn listen_target(&self) -> String {
        let host = if self.host.is_empty() { "0.0.0.0" } else { &self.host };
        format!("{host}:{}", self.port)
    }
}

impl fmt::Display for TcpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Dial `addr` with TCP_NODELAY and keep-alive probes every `keepalive`.
pub(crate) async fn dial(addr: &TcpAddress, keepalive: Duration) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr.dial_target()).await?;
    stream.set_nodelay(DEFAULT_TCP_NO_DELAY)?;

    let params = TcpKeepalive::new().with_time(keepalive);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "freebsd"
    ))]
    let params = params.with_interval(keepalive);
    SockRef::from(&stream).set_tcp_keepalive(&params)?;

    Ok(stream)
}

/// Resolve `addr` and bind a listener with the given backlog.
pub(crate) async fn listen(addr: &TcpAddress, backlog: u32) -> std::io::Result<TcpListener> {
    let target = addr.listen_target();
    let resolved = tokio::net::lookup_host(&target).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("{target} did not resolve to any address"),
        )
    })?;
    create_listener(resolved, backlog)
}

/// Create a TCP listener with custom backlog.
fn create_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    TcpListener::from_std(std::net::TcpListener::from(socket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let addr = TcpAddress::parse("127.0.0.1:9000").unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 9000);
        assert_eq!(addr.to_string(), "127.0.0.1:9000");

        let addr = TcpAddress::parse("localhost:0").unwrap();
        assert_eq!(addr.port(), 0);
    }

    #[test]
    fn test_parse_empty_host() {
        let addr = TcpAddress::parse(":8080").unwrap();
        assert_eq!(addr.host(), "");
        assert_eq!(addr.dial_target(), "127.0.0.1:8080");
        assert_eq!(addr.listen_target(), "0.0.0.0:8080");
    }

    #[test]
    fn test_parse_wrong_format() {
        for bad in ["localhost", "a:b:c", "[::1]:80", ""] {
            let err = TcpAddress::parse(bad).unwrap_err();
            assert!(
                matches!(err, RelayError::InvalidAddress(_)),
                "{bad:?} gave {err}"
            );
        }
    }

    #[test]
    fn test_parse_bad_port() {
        for bad in ["localhost:http", "localhost:", "localhost:70000", "localhost:-1"] {
            let err = TcpAddress::parse(bad).unwrap_err();
            assert!(
                matches!(err, RelayError::InvalidPort { .. }),
                "{bad:?} gave {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_dial_enables_keepalive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = TcpAddress::parse(&listener.local_addr().unwrap().to_string()).unwrap();

        let stream = dial(&addr, Duration::from_secs(15)).await.unwrap();
        assert!(stream.nodelay().unwrap());
        assert!(SockRef::from(&stream).keepalive().unwrap());
    }

    #[tokio::test]
    async fn test_listen_ephemeral_port() {
        let addr = TcpAddress::parse("127.0.0.1:0").unwrap();
        let listener = listen(&addr, 16).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}

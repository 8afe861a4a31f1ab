//! Dial and listen strategies for each transport.
//!
//! The relay engine only knows two capabilities: dialing the source
//! ([`SourceEndpoint::dial`]) and opening the destination listener
//! ([`DestinationEndpoint::listen`]). Each is a small closed set of
//! transport variants, and the directional constructors pick one of each.

pub mod tcp;
pub mod unix;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use sockrelay_core::defaults::DEFAULT_CONNECTION_BACKLOG;

use crate::error::RelayError;

pub use tcp::TcpAddress;
pub use unix::remove_socket_file;

/// Where the relay dials a fresh connection for every accepted client.
#[derive(Debug, Clone)]
pub enum SourceEndpoint {
    /// TCP with keep-alive probes every `keepalive`.
    Tcp { addr: TcpAddress, keepalive: Duration },
    /// Unix domain stream socket; no keep-alive concept.
    Unix { path: PathBuf },
}

impl SourceEndpoint {
    /// Dial the source, giving up as soon as `shutdown` fires.
    pub async fn dial(&self, shutdown: &CancellationToken) -> Result<RelayStream, RelayError> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(RelayError::Cancelled(self.to_string())),
            result = self.connect() => result,
        }
    }

    async fn connect(&self) -> Result<RelayStream, RelayError> {
        let result = match self {
            SourceEndpoint::Tcp { addr, keepalive } => {
                tcp::dial(addr, *keepalive).await.map(RelayStream::Tcp)
            }
            SourceEndpoint::Unix { path } => unix::dial(path).await.map(RelayStream::Unix),
        };
        result.map_err(|source| RelayError::Dial {
            addr: self.to_string(),
            source,
        })
    }
}

impl fmt::Display for SourceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEndpoint::Tcp { addr, .. } => write!(f, "{addr}"),
            SourceEndpoint::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Where the relay listens for clients.
#[derive(Debug, Clone)]
pub enum DestinationEndpoint {
    Tcp { addr: TcpAddress },
    Unix { path: PathBuf },
}

impl DestinationEndpoint {
    /// Open the listener. Binding is not retried.
    pub async fn listen(&self, shutdown: &CancellationToken) -> io::Result<RelayListener> {
        let bind = async {
            match self {
                DestinationEndpoint::Tcp { addr } => tcp::listen(addr, DEFAULT_CONNECTION_BACKLOG)
                    .await
                    .map(RelayListener::Tcp),
                DestinationEndpoint::Unix { path } => unix::listen(path).map(RelayListener::Unix),
            }
        };
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "shutdown requested before the listener was bound",
            )),
            result = bind => result,
        }
    }

    /// Path of the Unix socket this endpoint creates, if any.
    pub fn socket_path(&self) -> Option<&PathBuf> {
        match self {
            DestinationEndpoint::Unix { path } => Some(path),
            DestinationEndpoint::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for DestinationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationEndpoint::Tcp { addr } => write!(f, "{addr}"),
            DestinationEndpoint::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

/// An open destination listener.
#[derive(Debug)]
pub enum RelayListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl RelayListener {
    /// Accept one client, returning it with a printable peer label.
    pub async fn accept(&self) -> io::Result<(RelayStream, String)> {
        match self {
            RelayListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((RelayStream::Tcp(stream), peer.to_string()))
            }
            RelayListener::Unix(listener) => {
                let (stream, peer) = listener.accept().await?;
                // Clients of a Unix listener are usually unnamed.
                let label = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix:unnamed".to_string());
                Ok((RelayStream::Unix(stream), label))
            }
        }
    }

    /// Bound TCP address, for listeners created on port 0.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            RelayListener::Tcp(listener) => listener.local_addr().ok(),
            RelayListener::Unix(_) => None,
        }
    }

    /// Printable local address.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            RelayListener::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            RelayListener::Unix(listener) => Ok(listener
                .local_addr()?
                .as_pathname()
                .map(|p| p.display().to_string())
                .unwrap_or_default()),
        }
    }
}

/// A relayed connection of either transport.
#[derive(Debug)]
pub enum RelayStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for RelayStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RelayStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            RelayStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RelayStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            RelayStream::Tcp(s) => Pin::new(s).poll_write(cx, data),
            RelayStream::Unix(s) => Pin::new(s).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RelayStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            RelayStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RelayStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            RelayStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_cancelled() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let source = SourceEndpoint::Unix {
            path: PathBuf::from("/nonexistent/relay.sock"),
        };
        let err = source.dial(&shutdown).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_dial_failure_names_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        let source = SourceEndpoint::Unix { path: path.clone() };

        let err = source.dial(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RelayError::Dial { .. }));
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[tokio::test]
    async fn test_unix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dst.sock");
        let shutdown = CancellationToken::new();

        let destination = DestinationEndpoint::Unix { path: path.clone() };
        let listener = destination.listen(&shutdown).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), path.display().to_string());
        assert!(listener.tcp_addr().is_none());

        let source = SourceEndpoint::Unix { path };
        let mut dialed = source.dial(&shutdown).await.unwrap();
        let (mut accepted, _peer) = listener.accept().await.unwrap();

        dialed.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let shutdown = CancellationToken::new();
        let destination = DestinationEndpoint::Tcp {
            addr: TcpAddress::parse("127.0.0.1:0").unwrap(),
        };
        let listener = destination.listen(&shutdown).await.unwrap();
        let bound = listener.tcp_addr().unwrap();

        let source = SourceEndpoint::Tcp {
            addr: TcpAddress::parse(&bound.to_string()).unwrap(),
            keepalive: Duration::from_secs(15),
        };
        let mut dialed = source.dial(&shutdown).await.unwrap();
        let (mut accepted, peer) = listener.accept().await.unwrap();
        assert!(peer.starts_with("127.0.0.1:"));

        accepted.write_all(b"xyz").await.unwrap();
        let mut buf = [0u8; 3];
        dialed.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"xyz");
    }
}

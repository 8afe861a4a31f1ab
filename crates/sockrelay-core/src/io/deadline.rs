//! Deadline-bounded stream adapter.
//!
//! `DeadlineStream` wraps any async stream so that no single read, write or
//! flush can stay pending forever. Each call arms an absolute deadline when it
//! starts (`now + timeout`); if the inner stream has not completed the call by
//! then, the call fails with [`io::ErrorKind::TimedOut`]. A completed call
//! disarms the deadline, so the next call gets a fresh one.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::{Sleep, sleep};

/// A stream wrapper enforcing per-call read and write deadlines.
///
/// A zero timeout disables the bound for that direction.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use sockrelay_core::io::DeadlineStream;
///
/// let timeout = Duration::from_secs(30);
/// let mut conn = DeadlineStream::new(tcp_stream, timeout, timeout);
/// // Any read that sees no data for 30s now fails with `TimedOut`.
/// conn.close().await?;
/// ```
pub struct DeadlineStream<S> {
    inner: S,
    read_timeout: Duration,
    write_timeout: Duration,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
    closed: bool,
}

impl<S> DeadlineStream<S> {
    /// Wrap `inner`, bounding reads by `read_timeout` and writes by `write_timeout`.
    pub fn new(inner: S, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            inner,
            read_timeout,
            write_timeout,
            read_deadline: None,
            write_deadline: None,
            closed: false,
        }
    }

    /// Read timeout applied to each read call.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Write timeout applied to each write, flush and shutdown call.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Whether [`close`](Self::close) (or a shutdown) has already completed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: AsyncWrite + Unpin> DeadlineStream<S> {
    /// Shut the underlying stream down.
    ///
    /// Only the first call reaches the inner stream; later calls return
    /// `Ok(())` without touching it.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.shutdown().await
    }
}

/// Poll an armed deadline, arming it first if this is the start of a call.
///
/// Returns `Ready` once the deadline has expired.
fn poll_deadline(
    slot: &mut Option<Pin<Box<Sleep>>>,
    timeout: Duration,
    cx: &mut Context<'_>,
) -> Poll<()> {
    if timeout.is_zero() {
        return Poll::Pending;
    }
    let deadline = slot.get_or_insert_with(|| Box::pin(sleep(timeout)));
    deadline.as_mut().poll(cx)
}

fn timed_out(op: &str, timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{op} deadline of {}ms exceeded", timeout.as_millis()),
    )
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(res) => {
                this.read_deadline = None;
                Poll::Ready(res)
            }
            Poll::Pending => match poll_deadline(&mut this.read_deadline, this.read_timeout, cx) {
                Poll::Ready(()) => {
                    this.read_deadline = None;
                    Poll::Ready(Err(timed_out("read", this.read_timeout)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, data) {
            Poll::Ready(res) => {
                this.write_deadline = None;
                Poll::Ready(res)
            }
            Poll::Pending => match poll_deadline(&mut this.write_deadline, this.write_timeout, cx) {
                Poll::Ready(()) => {
                    this.write_deadline = None;
                    Poll::Ready(Err(timed_out("write", this.write_timeout)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(res) => {
                this.write_deadline = None;
                Poll::Ready(res)
            }
            Poll::Pending => match poll_deadline(&mut this.write_deadline, this.write_timeout, cx) {
                Poll::Ready(()) => {
                    this.write_deadline = None;
                    Poll::Ready(Err(timed_out("flush", this.write_timeout)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut this.inner).poll_shutdown(cx) {
            Poll::Ready(res) => {
                this.write_deadline = None;
                this.closed = true;
                Poll::Ready(res)
            }
            Poll::Pending => match poll_deadline(&mut this.write_deadline, this.write_timeout, cx) {
                Poll::Ready(()) => {
                    this.write_deadline = None;
                    this.closed = true;
                    Poll::Ready(Err(timed_out("shutdown", this.write_timeout)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_read_passes_data_through() {
        let (mut peer, inner) = duplex(64);
        let mut stream = DeadlineStream::new(inner, Duration::from_secs(5), Duration::from_secs(5));

        peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        stream.write_all(b"pong").await.unwrap();
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_idle_read_times_out() {
        let (_peer, inner) = duplex(64);
        let mut stream =
            DeadlineStream::new(inner, Duration::from_millis(50), Duration::from_secs(5));

        let start = Instant::now();
        let mut buf = [0u8; 16];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_deadline_rearms_per_call() {
        let (mut peer, inner) = duplex(64);
        let mut stream =
            DeadlineStream::new(inner, Duration::from_millis(100), Duration::from_secs(5));

        let writer = tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(60)).await;
                peer.write_all(b"x").await.unwrap();
            }
            peer
        });

        // Each read completes within its own window even though the total
        // elapsed time exceeds one timeout.
        let start = Instant::now();
        let mut buf = [0u8; 1];
        for _ in 0..3 {
            stream.read_exact(&mut buf).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(150));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_blocked_write_times_out() {
        // 4-byte pipe that nobody drains
        let (_peer, inner) = duplex(4);
        let mut stream =
            DeadlineStream::new(inner, Duration::from_secs(5), Duration::from_millis(50));

        let err = stream.write_all(&[0u8; 64]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_zero_timeout_disables_deadline() {
        let (mut peer, inner) = duplex(64);
        let mut stream = DeadlineStream::new(inner, Duration::ZERO, Duration::ZERO);

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).await.map(|_| buf)
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.write_all(b"ok").await.unwrap();
        assert_eq!(&reader.await.unwrap().unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut peer, inner) = duplex(64);
        let mut stream = DeadlineStream::new(inner, Duration::from_secs(1), Duration::from_secs(1));

        stream.close().await.unwrap();
        assert!(stream.is_closed());
        stream.close().await.unwrap();

        // Peer observes EOF after the first close.
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }
}

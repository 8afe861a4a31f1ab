//! Bidirectional data relay with configurable metrics.
//!
//! This module provides the duplex copy that links the two connections of a
//! pairing. Metrics recording is abstracted via the `RelayMetrics` trait so
//! the relay crate can feed its own backend while tests use a no-op.
//!
//! Each direction is driven as an independent poll-based state machine within
//! a single future, so back-pressure on one direction never stalls the other.
//! The relay ends as soon as either direction ends: a pairing lives no longer
//! than the shorter-lived of its two streams.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;

/// Trait for recording relay metrics.
///
/// Implementors can record bytes transferred in each direction.
pub trait RelayMetrics {
    /// Record bytes copied from the first stream to the second (client -> source).
    fn record_inbound(&self, bytes: u64);
    /// Record bytes copied from the second stream to the first (source -> client).
    fn record_outbound(&self, bytes: u64);
}

/// No-op metrics implementation for cases where metrics aren't needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl RelayMetrics for NoOpMetrics {
    #[inline]
    fn record_inbound(&self, _bytes: u64) {}
    #[inline]
    fn record_outbound(&self, _bytes: u64) {}
}

/// Why a relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The first stream reached end-of-stream.
    InboundClosed,
    /// The second stream reached end-of-stream.
    OutboundClosed,
    /// The shutdown token fired.
    Cancelled,
}

/// Byte counts and termination reason of a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes written to the second stream.
    pub inbound_bytes: u64,
    /// Bytes written to the first stream.
    pub outbound_bytes: u64,
    pub end: RelayEnd,
}

/// State machine for one-directional copy with flush.
enum CopyState {
    Reading,
    Writing(usize, usize), // (pos, len)
    Flushing(usize),       // bytes flushing
    Done,
}

/// Result of polling one copy direction.
enum CopyPoll {
    /// Data was flushed; carries the byte count for metrics.
    Flushed(usize),
    /// Read side reached EOF.
    Eof,
}

/// Poll-driven one-directional copy: read → write → flush.
fn poll_copy_direction<R, W>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    state: &mut CopyState,
) -> Poll<io::Result<CopyPoll>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        match state {
            CopyState::Reading => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            *state = CopyState::Done;
                            return Poll::Ready(Ok(CopyPoll::Eof));
                        }
                        *state = CopyState::Writing(0, n);
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Writing(pos, len) => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*pos..*len]) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "peer stopped accepting data",
                        )));
                    }
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= *len {
                            let total = *len;
                            *state = CopyState::Flushing(total);
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Flushing(bytes) => {
                let bytes = *bytes;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = CopyState::Reading;
                        return Poll::Ready(Ok(CopyPoll::Flushed(bytes)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Done => return Poll::Ready(Ok(CopyPoll::Eof)),
        }
    }
}

/// Copy bytes between `inbound` and `outbound` until either side ends.
///
/// Both directions run concurrently within a single task using poll-based
/// I/O. The relay returns as soon as one direction reaches end-of-stream or
/// `shutdown` fires; the first I/O error (including a deadline expiry from a
/// [`DeadlineStream`](super::DeadlineStream)) is returned as `Err`. The
/// streams are only borrowed, so the caller closes both afterwards.
///
/// # Arguments
///
/// * `inbound` - The accepted client connection
/// * `outbound` - The connection dialed for that client
/// * `buffer_size` - Bytes per copy chunk, one buffer per direction
/// * `shutdown` - Relay-wide cancellation signal
/// * `metrics` - Metrics recorder for tracking bytes transferred
pub async fn relay_bidirectional<A, B, M>(
    inbound: &mut A,
    outbound: &mut B,
    buffer_size: usize,
    shutdown: &CancellationToken,
    metrics: &M,
) -> io::Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
    M: RelayMetrics + ?Sized,
{
    let mut buf_a = vec![0u8; buffer_size.max(1)];
    let mut buf_b = vec![0u8; buffer_size.max(1)];
    let mut state_a = CopyState::Reading;
    let mut state_b = CopyState::Reading;
    let mut inbound_bytes = 0u64;
    let mut outbound_bytes = 0u64;

    // Polls both directions; each registers its own waker so either can make
    // progress independently. The two calls borrow the streams one after the
    // other, reading from one while writing to the other.
    let both = std::future::poll_fn(|cx| {
        loop {
            let mut progressed = false;

            match poll_copy_direction(cx, inbound, outbound, &mut buf_a, &mut state_a) {
                Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                    metrics.record_inbound(n as u64);
                    inbound_bytes += n as u64;
                    progressed = true;
                }
                Poll::Ready(Ok(CopyPoll::Eof)) => {
                    return Poll::Ready(Ok(RelayEnd::InboundClosed));
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }

            match poll_copy_direction(cx, outbound, inbound, &mut buf_b, &mut state_b) {
                Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                    metrics.record_outbound(n as u64);
                    outbound_bytes += n as u64;
                    progressed = true;
                }
                Poll::Ready(Ok(CopyPoll::Eof)) => {
                    return Poll::Ready(Ok(RelayEnd::OutboundClosed));
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }

            if !progressed {
                return Poll::Pending;
            }
        }
    });

    let end = tokio::select! {
        biased;
        _ = shutdown.cancelled() => RelayEnd::Cancelled,
        result = both => result?,
    };

    Ok(RelayStats {
        inbound_bytes,
        outbound_bytes,
        end,
    })
}

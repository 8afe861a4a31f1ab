//! Fake Unix socket server for manual testing.
//!
//! Every client gets [`FAKE_GREETING`] once per
//! [`FAKE_GREETING_INTERVAL_SECS`] until it disconnects or the server stops.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use sockrelay_core::defaults::{FAKE_GREETING, FAKE_GREETING_INTERVAL_SECS};

use crate::endpoint::remove_socket_file;
use crate::error::RelayError;

/// Serve greetings on a Unix socket at `path` until `shutdown` fires.
///
/// A leftover socket at `path` is removed first, and the socket file is
/// removed again on exit.
pub async fn run_fake_server(path: &Path, shutdown: CancellationToken) -> Result<(), RelayError> {
    remove_socket_file(path);
    let listener = UnixListener::bind(path).map_err(|source| RelayError::Listen {
        name: "unix socket",
        addr: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "fake server listening");

    let result = accept_loop(listener, path, &shutdown).await;
    remove_socket_file(path);
    result
}

async fn accept_loop(
    listener: UnixListener,
    path: &Path,
    shutdown: &CancellationToken,
) -> Result<(), RelayError> {
    let mut next_id = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("fake server stopping");
                return Ok(());
            }
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    next_id += 1;
                    info!(client = next_id, path = %path.display(), "opened connection");
                    tokio::spawn(
                        greet(stream, shutdown.clone())
                            .instrument(info_span!("fake", client = next_id)),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "connection error");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

async fn greet(mut stream: UnixStream, shutdown: CancellationToken) {
    let period = Duration::from_secs(FAKE_GREETING_INTERVAL_SECS);
    loop {
        if let Err(e) = stream.write_all(FAKE_GREETING).await {
            debug!(error = %e, "client gone");
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(period) => {}
        }
    }
}

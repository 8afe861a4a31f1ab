//! Unix domain stream socket dialing and listening.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

pub(crate) async fn dial(path: &Path) -> io::Result<UnixStream> {
    UnixStream::connect(path).await
}

/// Bind a stream listener at `path`.
///
/// Fails with `AddrInUse` if anything already exists at the path; stale
/// sockets are not reclaimed.
pub(crate) fn listen(path: &Path) -> io::Result<UnixListener> {
    UnixListener::bind(path)
}

/// Best-effort removal of a Unix socket file.
///
/// Only socket files are removed; anything else at the path is left alone.
pub fn remove_socket_file(path: &Path) {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed unix socket"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove unix socket"),
        },
        Ok(_) => warn!(path = %path.display(), "not a unix socket, leaving it in place"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to stat unix socket"),
    }
}

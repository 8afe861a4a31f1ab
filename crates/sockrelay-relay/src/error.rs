//! Error types for the relay crate.

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use sockrelay_core::{
    ERROR_ACCEPT, ERROR_CANCELLED, ERROR_CONFIG, ERROR_DIAL, ERROR_IO, ERROR_LISTEN, ERROR_TIMEOUT,
};

use crate::config::ConfigError;

/// Errors that can occur in the relay system.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("wrong format for tcp address {0}. Expected <addr>:<port>")]
    InvalidAddress(String),

    #[error("could not parse specified port number {port}: {source}")]
    InvalidPort {
        port: String,
        #[source]
        source: ParseIntError,
    },

    #[error("could not stat {}: {source}", path.display())]
    SourceMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen at {name} address {addr}: {source}")]
    Listen {
        name: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept on {addr} failed: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("dial to {0} abandoned: shutdown requested")]
    Cancelled(String),
}

impl RelayError {
    /// Get the error type string for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Io(e) if e.kind() == io::ErrorKind::TimedOut => ERROR_TIMEOUT,
            RelayError::Io(_) => ERROR_IO,
            RelayError::Config(_)
            | RelayError::InvalidAddress(_)
            | RelayError::InvalidPort { .. }
            | RelayError::SourceMissing { .. } => ERROR_CONFIG,
            RelayError::Dial { .. } => ERROR_DIAL,
            RelayError::Listen { .. } => ERROR_LISTEN,
            RelayError::Accept { .. } => ERROR_ACCEPT,
            RelayError::Cancelled(_) => ERROR_CANCELLED,
        }
    }

    /// Whether this error was caused by the relay shutting down.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled(_))
    }
}

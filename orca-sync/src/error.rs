//! Error types for orca-sync.

use std::path::PathBuf;

use thiserror::Error;

use orca_compose::{ApplyError, LoadError};

/// Errors from fetching the remote definition.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request itself cannot be built (malformed URL, unknown scheme,
    /// no usable file name). Retrying cannot help.
    #[error("cannot build request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    /// Network, DNS or timeout failure.
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("bad status fetching {url}: {code} {text}")]
    Status { url: String, code: u16, text: String },

    /// Failure writing the fetched bytes into the working directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether the stack's loop should stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::InvalidRequest { .. })
    }
}

/// All errors that can arise inside a reconciliation cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Working or target directory could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plan error: {0}")]
    Plan(#[from] LoadError),

    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Fetch(err) => err.is_fatal(),
            _ => false,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

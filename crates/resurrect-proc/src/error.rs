//! Error types for process lookup and signalling.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for process locator operations.
pub type ProcResult<T> = Result<T, ProcError>;

#[derive(Debug, Error)]
pub enum ProcError {
    /// Zero or more than one process listens on the port.
    #[error("expected exactly one process listening on port {port}, found {}", owners.len())]
    AmbiguousOwner { port: u16, owners: Vec<u32> },

    #[error("process {0} is gone")]
    ProcessGone(u32),

    #[error("not permitted to signal process {0}")]
    PermissionDenied(u32),

    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

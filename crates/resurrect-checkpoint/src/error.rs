//! Error types for the checkpoint store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint path {0} exists and is not a directory")]
    NotADirectory(PathBuf),

    #[error("checkpoint i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialize(String),
}

use std::path::PathBuf;

/// Errors from snapshot file operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// I/O error while writing the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be serialized to snapshot text.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot file is corrupt and has been removed.
    #[error("corrupt snapshot {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Result alias for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

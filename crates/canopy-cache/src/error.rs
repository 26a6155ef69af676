use canopy_snapshot::SnapshotError;
use canopy_source::SourceError;
use canopy_tree::TreeError;

/// Errors from the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Mutually exclusive configuration options were both enabled.
    ///
    /// Fatal at startup: the cache refuses to initialize.
    #[error("conflicting configuration: {0}")]
    ConfigConflict(String),

    /// A change batch violated an integrity contract.
    ///
    /// Fatal to the batch: the in-progress clone is discarded and the
    /// live tree is left unchanged.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Tree mutation failure.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Row source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Snapshot file failure.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The change notifier has been shut down.
    #[error("change notifier is shut down")]
    Shutdown,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

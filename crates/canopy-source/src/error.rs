use canopy_tree::TreeError;

/// Errors from row-source queries and tree loading.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The underlying store failed to execute a query.
    #[error("row source backend error: {0}")]
    Backend(String),

    /// I/O error from the underlying store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be applied to the document being built.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Result alias for row-source operations.
pub type SourceResult<T> = Result<T, SourceError>;

use crate::node::NodeId;

/// Errors from tree document operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    /// A node with this id is already present in the document.
    #[error("node already exists: {0}")]
    NodeExists(NodeId),

    /// The requested node was not found.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// The target parent is not present in the document.
    ///
    /// Callers treat this as a *masked* condition: the subtree is out of
    /// sync and the operation is skipped, not aborted.
    #[error("parent {parent} not found for node {node}")]
    ParentNotFound { node: NodeId, parent: NodeId },

    /// A node is present but its parent link does not resolve.
    ///
    /// This is an integrity violation, fatal to the current operation.
    #[error("node {0} has no resolvable parent link")]
    MissingParent(NodeId),

    /// The synthetic root node cannot be moved or removed.
    #[error("the root node is immutable")]
    RootImmutable,

    /// A structural invariant does not hold (level, path or sibling order).
    #[error("structural inconsistency at node {node}: {reason}")]
    Inconsistent { node: NodeId, reason: String },
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

use canopy_tree::NodeId;

use crate::error::SourceResult;
use crate::row::{ItemState, NodeRow};

/// Ordered row source over the relational content store.
///
/// All implementations must satisfy these invariants:
/// - Rows come back ordered by `(level, sort_order)` ascending, so parents
///   are delivered before their children.
/// - `branch_rows` scopes the result to one subtree via a path-prefix
///   filter, and its first row is the branch root itself.
/// - Queries are read-only; write-side consistency (running inside a
///   repeatable-read transaction) is the caller's responsibility.
/// - All backend errors are propagated, never silently ignored.
pub trait RowSource: Send + Sync {
    /// All content rows for a full tree build.
    fn content_rows(&self) -> SourceResult<Vec<NodeRow>>;

    /// Rows for the subtree rooted at `id`, whose stored path is `path`.
    fn branch_rows(&self, id: NodeId, path: &str) -> SourceResult<Vec<NodeRow>>;

    /// Current domain state of an item.
    ///
    /// Returns `Ok(None)` if the item no longer exists in the store.
    fn item_state(&self, id: NodeId) -> SourceResult<Option<ItemState>>;
}

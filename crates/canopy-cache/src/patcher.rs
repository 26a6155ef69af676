//! Incremental tree patching.
//!
//! A change batch is applied to one already-cloned tree: subtrees are
//! removed, reloaded from the row source, or patched in place, deciding
//! per item whether a full branch reload or a local content patch
//! suffices. The caller owns the clone-and-commit protocol; this module
//! never touches the live tree.
//!
//! Failure discrimination follows one rule throughout: a violated
//! integrity contract (mismatched identities, broken parent links) aborts
//! the whole batch, while a missing target parent merely masks that item
//! -- the subtree is out of sync and will heal on a later full reload.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use canopy_source::{loader, NodeRow, RowSource};
use canopy_tree::{NodeId, TreeDocument, TreeError, ROOT_ID};

use crate::error::{CacheError, CacheResult};

/// What happened to an item, as reported by the change transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The whole tree is invalid and must be rebuilt.
    RefreshAll,
    /// The item was deleted; its subtree goes away.
    Remove,
    /// The item's content changed.
    RefreshNode,
    /// The item and all its descendants must be reloaded.
    RefreshBranch,
}

/// One entry of a change batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub id: NodeId,
    pub kind: ChangeKind,
}

impl ChangeDescriptor {
    /// Invalidate the whole tree.
    pub fn refresh_all() -> Self {
        Self {
            id: ROOT_ID,
            kind: ChangeKind::RefreshAll,
        }
    }

    /// Delete the subtree rooted at `id`.
    pub fn remove(id: NodeId) -> Self {
        Self {
            id,
            kind: ChangeKind::Remove,
        }
    }

    /// Reload one item's content.
    pub fn refresh_node(id: NodeId) -> Self {
        Self {
            id,
            kind: ChangeKind::RefreshNode,
        }
    }

    /// Reload one item and all its descendants.
    pub fn refresh_branch(id: NodeId) -> Self {
        Self {
            id,
            kind: ChangeKind::RefreshBranch,
        }
    }
}

/// Applies change batches to a cloned tree.
pub struct IncrementalPatcher {
    source: Arc<dyn RowSource>,
}

impl IncrementalPatcher {
    /// Create a patcher over the given row source.
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self { source }
    }

    /// Apply a whole batch to `tree`, returning whether anything changed.
    ///
    /// There are no retries within a batch: the first integrity violation
    /// propagates, and the caller discards the clone.
    pub fn apply(&self, tree: &mut TreeDocument, batch: &[ChangeDescriptor]) -> CacheResult<bool> {
        let mut changed = false;
        for descriptor in batch {
            match descriptor.kind {
                ChangeKind::RefreshAll => {
                    *tree = loader::load_full(&*self.source, tree.schema().clone())?;
                    debug!("full reload applied");
                    changed = true;
                }
                ChangeKind::Remove => changed |= remove_if_present(tree, descriptor.id)?,
                ChangeKind::RefreshNode => changed |= self.refresh_item(tree, descriptor.id, false)?,
                ChangeKind::RefreshBranch => changed |= self.refresh_item(tree, descriptor.id, true)?,
            }
        }
        Ok(changed)
    }

    /// Refresh one item from the row source, deciding between a branch
    /// reload and an in-place patch.
    fn refresh_item(
        &self,
        tree: &mut TreeDocument,
        id: NodeId,
        force_branch: bool,
    ) -> CacheResult<bool> {
        let Some(state) = self.source.item_state(id)?.filter(|state| state.is_visible()) else {
            debug!(id, "item unpublished or trashed; removing local copy");
            return remove_if_present(tree, id);
        };

        let mut rows = loader::load_branch(&*self.source, id, &state.path)?.into_iter();
        let Some(first) = rows.next() else {
            // The store no longer yields anything visible here.
            return remove_if_present(tree, id);
        };
        if first.id != id {
            return Err(CacheError::Integrity(format!(
                "branch stream for item {id} starts at row {}",
                first.id
            )));
        }

        let (is_new, dirty, moved) = match tree.get(id) {
            None => (true, true, false),
            Some(node) => (
                false,
                node.revision != first.revision,
                node.path != first.path,
            ),
        };

        if is_new || dirty || moved || force_branch {
            self.refresh_branch(tree, first, rows)
        } else {
            Self::add_or_update_node(tree, &first)
        }
    }

    /// Replace an item and its descendants with freshly streamed rows.
    fn refresh_branch(
        &self,
        tree: &mut TreeDocument,
        first: NodeRow,
        rest: impl Iterator<Item = NodeRow>,
    ) -> CacheResult<bool> {
        let id = first.id;
        let removed = remove_if_present(tree, id)?;

        let parent_id = if first.level <= 1 { ROOT_ID } else { first.parent_id };
        if !tree.contains(parent_id) {
            warn!(id, parent = parent_id, "branch parent not in tree; item masked");
            return Ok(removed);
        }

        tree.append_child(parent_id, first.into_fragment())?;
        tree.position_by_sort_order(id)?;

        // Remaining rows arrive parents-first; each attaches under its own
        // (already relocated) parent, in stream order.
        let mut attached = 1usize;
        for row in rest {
            let row_parent = row.parent_id;
            match tree.append_child(row_parent, row.into_fragment()) {
                Ok(_) => attached += 1,
                Err(TreeError::ParentNotFound { node, parent }) => {
                    warn!(id = node, parent, "row parent not in tree; row masked");
                }
                Err(other) => return Err(other.into()),
            }
        }

        debug!(id, attached, "branch refreshed");
        Ok(true)
    }

    /// Patch one node in place, creating it if absent.
    ///
    /// The row's embedded fragment must agree with the row's own identity
    /// columns -- a mismatch means the serializer and the query produced
    /// different items, which is fatal. Identity children are never
    /// touched: content (attributes and data elements) is replaced
    /// wholesale, the node is re-parented if the row says so, and finally
    /// nudged into sibling position by ascending `sort_order`.
    ///
    /// Applying the same row twice is idempotent; an application that
    /// changes nothing reports `false`.
    pub fn add_or_update_node(tree: &mut TreeDocument, row: &NodeRow) -> CacheResult<bool> {
        if row.fragment.id != row.id || row.fragment.parent_id != row.parent_id {
            return Err(CacheError::Integrity(format!(
                "fragment identity {}/{} does not match row identity {}/{}",
                row.fragment.id, row.fragment.parent_id, row.id, row.parent_id
            )));
        }

        let id = row.id;
        let fragment = row.clone().into_fragment();

        if !tree.contains(id) && !tree.schema().legacy {
            tree.schema_mut().ensure_declared(&fragment.tag);
        }

        let parent_id = if row.level <= 1 { ROOT_ID } else { row.parent_id };
        if !tree.contains(parent_id) {
            warn!(id, parent = parent_id, "target parent not in tree; node masked");
            return Ok(false);
        }

        if !tree.contains(id) {
            tree.append_child(parent_id, fragment)?;
            tree.position_by_sort_order(id)?;
            return Ok(true);
        }

        let (old_parent, unchanged) = {
            let existing = tree.get(id).ok_or(TreeError::NodeNotFound(id))?;
            let unchanged = existing.parent_id == parent_id
                && existing.level == fragment.level
                && existing.path == fragment.path
                && existing.sort_order == fragment.sort_order
                && existing.revision == fragment.revision
                && existing.tag == fragment.tag
                && existing.attributes == fragment.attributes
                && existing.data == fragment.data;
            (existing.parent_id, unchanged)
        };
        if unchanged {
            return Ok(false);
        }

        let relocated = old_parent != parent_id;
        if relocated {
            tree.reattach(id, parent_id)?;
        }
        if let Some(node) = tree.get_mut(id) {
            node.update_from_fragment(fragment);
        }
        if relocated {
            tree.refresh_subtree_positions(id)?;
        }
        tree.position_by_sort_order(id)?;
        Ok(true)
    }
}

/// Remove a subtree if its root is present.
///
/// Absent nodes are a no-op; a present node with a broken parent link is
/// an integrity violation.
fn remove_if_present(tree: &mut TreeDocument, id: NodeId) -> CacheResult<bool> {
    match tree.remove_subtree(id) {
        Ok(removed) => {
            debug!(id, removed, "subtree removed");
            Ok(true)
        }
        Err(TreeError::NodeNotFound(_)) => Ok(false),
        Err(TreeError::MissingParent(node)) => Err(CacheError::Integrity(format!(
            "node {node} has no resolvable parent link"
        ))),
        Err(other) => Err(other.into()),
    }
}

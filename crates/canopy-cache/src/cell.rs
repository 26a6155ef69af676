//! The live-tree pointer.
//!
//! Readers take a cheap shared reference to the current tree without any
//! lock; writers swap a fully built replacement in atomically while
//! holding [`SnapshotLock`](crate::lock::SnapshotLock). A reference
//! captured before a swap stays valid indefinitely -- the superseded tree
//! is immutable by convention once published.

use std::sync::Arc;

use arc_swap::ArcSwap;

use canopy_tree::TreeDocument;

/// Holds the single authoritative tree pointer.
pub struct SnapshotCell {
    current: ArcSwap<TreeDocument>,
}

impl SnapshotCell {
    /// Create a cell publishing the given tree.
    pub fn new(tree: TreeDocument) -> Self {
        Self {
            current: ArcSwap::from_pointee(tree),
        }
    }

    /// The current live tree. Lock-free.
    pub fn current(&self) -> Arc<TreeDocument> {
        self.current.load_full()
    }

    /// Publish a new live tree, returning the superseded one.
    ///
    /// Callers hold `SnapshotLock` -- the cell itself does not enforce
    /// writer exclusion, only atomicity of the pointer swap.
    pub fn swap(&self, tree: Arc<TreeDocument>) -> Arc<TreeDocument> {
        self.current.swap(tree)
    }
}

impl std::fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("nodes", &self.current().len())
            .finish()
    }
}

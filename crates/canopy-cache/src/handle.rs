//! Scoped accessors over the live tree.
//!
//! A [`ReadHandle`] is a captured reference: readers get the current tree
//! without cloning and without touching the writer lock, and the capture
//! stays valid for as long as the handle (or a [`snapshot`] taken from it)
//! is kept -- superseded trees are immutable by convention.
//!
//! A [`WriteHandle`] is the clone-on-write protocol: it holds the
//! [`SnapshotGuard`] for its whole lifetime, exposes a private clone of
//! the live tree for mutation, and publishes it atomically on commit. A
//! handle dropped without committing discards the clone -- unless it was
//! opened with `auto_commit`, in which case dropping commits with default
//! registration.
//!
//! [`snapshot`]: ReadHandle::snapshot

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use canopy_tree::TreeDocument;

use crate::cache::ContentCache;
use crate::lock::SnapshotGuard;

/// A captured reference to the live tree.
pub struct ReadHandle {
    tree: Arc<TreeDocument>,
}

impl ReadHandle {
    pub(crate) fn new(tree: Arc<TreeDocument>) -> Self {
        Self { tree }
    }

    /// A reference that outlives the handle.
    pub fn snapshot(&self) -> Arc<TreeDocument> {
        Arc::clone(&self.tree)
    }
}

impl Deref for ReadHandle {
    type Target = TreeDocument;

    fn deref(&self) -> &TreeDocument {
        &self.tree
    }
}

/// Exclusive access to a private clone of the live tree.
///
/// At most one write handle exists at any time; the embedded guard
/// serializes writers and is released when the handle drops.
pub struct WriteHandle<'a> {
    cache: &'a ContentCache,
    tree: Option<TreeDocument>,
    auto_commit: bool,
    committed: bool,
    _guard: SnapshotGuard,
}

impl<'a> WriteHandle<'a> {
    pub(crate) fn new(cache: &'a ContentCache, guard: SnapshotGuard, auto_commit: bool) -> Self {
        let tree = (*cache.current()).clone();
        Self {
            cache,
            tree: Some(tree),
            auto_commit,
            committed: false,
            _guard: guard,
        }
    }

    /// The mutable clone being built.
    ///
    /// # Panics
    ///
    /// Panics if the handle has already committed.
    pub fn tree_mut(&mut self) -> &mut TreeDocument {
        self.tree.as_mut().expect("write handle already committed")
    }

    /// The clone being built, read-only.
    ///
    /// # Panics
    ///
    /// Panics if the handle has already committed.
    pub fn tree(&self) -> &TreeDocument {
        self.tree.as_ref().expect("write handle already committed")
    }

    /// Publish the clone as the new live tree.
    ///
    /// The live pointer is updated exactly once; route caches keyed off
    /// tree identity are cleared; with `register_change`, commit-time
    /// persistence runs if the cache is configured for it. A second call
    /// is a no-op.
    pub fn commit(&mut self, register_change: bool) {
        if self.committed {
            return;
        }
        if let Some(tree) = self.tree.take() {
            self.cache.install(tree, register_change);
            self.committed = true;
        }
    }

    /// Returns `true` once the clone has been published.
    pub fn has_committed(&self) -> bool {
        self.committed
    }
}

impl Deref for WriteHandle<'_> {
    type Target = TreeDocument;

    fn deref(&self) -> &TreeDocument {
        self.tree()
    }
}

impl DerefMut for WriteHandle<'_> {
    fn deref_mut(&mut self) -> &mut TreeDocument {
        self.tree_mut()
    }
}

impl Drop for WriteHandle<'_> {
    fn drop(&mut self) {
        if !self.committed && self.auto_commit {
            if let Some(tree) = self.tree.take() {
                self.cache.install(tree, true);
                self.committed = true;
            }
        }
        // The guard drops last, releasing the writer lock.
    }
}

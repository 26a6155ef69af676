//! Row types delivered by the relational store.

use serde::{Deserialize, Serialize};

use canopy_tree::{NodeFragment, NodeId};

/// One ordered tuple from the relational store.
///
/// The positional columns (`parent_id`, `level`, `path`, `sort_order`,
/// `revision`) are authoritative; the embedded fragment is the opaque
/// domain serializer's output and is reconciled against them on use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub level: u32,
    pub sort_order: i32,
    pub path: String,
    pub revision: u64,
    pub published: bool,
    pub fragment: NodeFragment,
}

impl NodeRow {
    /// Build a row from a fragment, taking the positional columns from it.
    pub fn from_fragment(fragment: NodeFragment) -> Self {
        Self {
            id: fragment.id,
            parent_id: fragment.parent_id,
            level: fragment.level,
            sort_order: fragment.sort_order,
            path: fragment.path.clone(),
            revision: fragment.revision,
            published: true,
            fragment,
        }
    }

    /// Mark the row unpublished.
    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }

    /// The fragment with the row's positional columns stamped on.
    pub fn into_fragment(self) -> NodeFragment {
        let mut fragment = self.fragment;
        fragment.id = self.id;
        fragment.parent_id = self.parent_id;
        fragment.level = self.level;
        fragment.path = self.path;
        fragment.sort_order = self.sort_order;
        fragment.revision = self.revision;
        fragment
    }
}

/// Current domain state of an item, as seen by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    /// The item has a published version.
    pub published: bool,
    /// The item sits in the recycle bin.
    pub trashed: bool,
    /// The item's current ancestor-id chain (scopes branch queries).
    pub path: String,
}

impl ItemState {
    /// A live, published item at the given path.
    pub fn published_at(path: impl Into<String>) -> Self {
        Self {
            published: true,
            trashed: false,
            path: path.into(),
        }
    }

    /// Returns `true` if the item should be visible in the cache.
    pub fn is_visible(&self) -> bool {
        self.published && !self.trashed
    }
}

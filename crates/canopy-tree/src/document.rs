//! The content tree document.
//!
//! [`TreeDocument`] is the main data structure: an ordered tree of
//! identity-keyed nodes stored in a [`BTreeMap`] (deterministic
//! serialization), with each node carrying its ordered child list inline.
//! Identity lookup goes through the map, never through structural
//! traversal. Traversals are iterative (explicit work lists), so deep
//! trees cannot exhaust the stack.
//!
//! # Invariants
//!
//! - The synthetic root ([`ROOT_ID`]) is always present and never moves.
//! - Every other node has exactly one parent, and `level`/`path` agree
//!   with its position in the tree.
//! - Sibling `sort_order` values are non-decreasing in document order.
//!
//! [`validate`](TreeDocument::validate) checks all of the above.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TreeError, TreeResult};
use crate::node::{Node, NodeFragment, NodeId, TreeSchema, ROOT_ID};

/// An ordered tree of identity-keyed content nodes.
///
/// Exactly one document is "live" at any instant; all others are transient
/// clones owned by a write operation, or old snapshots still referenced by
/// in-flight readers. A published document is immutable by convention:
/// writers always mutate a private clone and swap it in atomically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDocument {
    /// All nodes keyed by id, including the synthetic root.
    nodes: std::collections::BTreeMap<NodeId, Node>,
    /// The doctype-equivalent schema declaration.
    schema: TreeSchema,
}

impl TreeDocument {
    /// Create an empty document holding only the synthetic root.
    pub fn new(schema: TreeSchema) -> Self {
        let mut nodes = std::collections::BTreeMap::new();
        nodes.insert(ROOT_ID, Node::root());
        Self { nodes, schema }
    }

    /// Number of content nodes (the synthetic root is not counted).
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns `true` if the document holds no content nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The synthetic root node.
    pub fn root(&self) -> &Node {
        self.nodes.get(&ROOT_ID).expect("root is always present")
    }

    /// The document schema.
    pub fn schema(&self) -> &TreeSchema {
        &self.schema
    }

    /// Mutable access to the document schema.
    pub fn schema_mut(&mut self) -> &mut TreeSchema {
        &mut self.schema
    }

    /// Identity lookup.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutable identity lookup.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Returns `true` if a node with this id is present.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Ordered iteration over a node's identity children.
    ///
    /// Empty if the node is absent.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(|child_id| self.nodes.get(child_id))
    }

    /// All content nodes in document order (depth-first, root excluded).
    pub fn nodes_in_order(&self) -> Vec<&Node> {
        let mut result = Vec::with_capacity(self.len());
        let mut stack: Vec<NodeId> = Vec::new();

        // Push root children in reverse so the first child pops first.
        for &child_id in self.root().children.iter().rev() {
            stack.push(child_id);
        }

        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                result.push(node);
                for &child_id in node.children.iter().rev() {
                    stack.push(child_id);
                }
            }
        }

        result
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Materialize a fragment as a new node appended under a parent.
    ///
    /// The fragment's positional fields are taken as authoritative. Errors
    /// if the parent is absent ([`TreeError::ParentNotFound`], a masked
    /// condition for callers) or the id is already present.
    pub fn append_child(&mut self, parent_id: NodeId, fragment: NodeFragment) -> TreeResult<NodeId> {
        let id = fragment.id;
        if self.nodes.contains_key(&id) {
            return Err(TreeError::NodeExists(id));
        }
        if !self.nodes.contains_key(&parent_id) {
            return Err(TreeError::ParentNotFound {
                node: id,
                parent: parent_id,
            });
        }

        let mut node = Node::from_fragment(fragment);
        node.parent_id = parent_id;

        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or(TreeError::ParentNotFound {
                node: id,
                parent: parent_id,
            })?;
        parent.children.push(id);
        self.nodes.insert(id, node);

        debug!(id, parent_id, "node appended");
        Ok(id)
    }

    /// Detach a node from its parent and drop its whole subtree.
    ///
    /// Returns the number of nodes removed. A present node whose parent
    /// link does not resolve is an integrity violation
    /// ([`TreeError::MissingParent`]); the root is never removable.
    pub fn remove_subtree(&mut self, id: NodeId) -> TreeResult<usize> {
        if id == ROOT_ID {
            return Err(TreeError::RootImmutable);
        }
        let parent_id = self
            .nodes
            .get(&id)
            .ok_or(TreeError::NodeNotFound(id))?
            .parent_id;

        self.unlink(id, parent_id)?;

        // Collect the subtree iteratively, then drop it from the map.
        let mut removed = 0usize;
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.remove(&current) {
                removed += 1;
                queue.extend(node.children);
            }
        }

        debug!(id, removed, "subtree removed");
        Ok(removed)
    }

    /// Move an existing node (with its subtree) under a new parent,
    /// appending it at the end of the new parent's children.
    ///
    /// The node's recorded `parent_id` must still point at the old parent
    /// when this is called. `level`/`path` of the node and its descendants
    /// are *not* recomputed here; callers follow up with
    /// [`refresh_subtree_positions`](Self::refresh_subtree_positions) or
    /// overwrite them from authoritative row data.
    pub fn reattach(&mut self, id: NodeId, new_parent_id: NodeId) -> TreeResult<()> {
        if id == ROOT_ID {
            return Err(TreeError::RootImmutable);
        }
        let old_parent_id = self
            .nodes
            .get(&id)
            .ok_or(TreeError::NodeNotFound(id))?
            .parent_id;
        if !self.nodes.contains_key(&new_parent_id) {
            return Err(TreeError::ParentNotFound {
                node: id,
                parent: new_parent_id,
            });
        }

        self.unlink(id, old_parent_id)?;

        let new_parent = self
            .nodes
            .get_mut(&new_parent_id)
            .ok_or(TreeError::ParentNotFound {
                node: id,
                parent: new_parent_id,
            })?;
        new_parent.children.push(id);

        let node = self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound(id))?;
        node.parent_id = new_parent_id;

        debug!(id, from = old_parent_id, to = new_parent_id, "node reattached");
        Ok(())
    }

    /// Single-element positional correction: move one child within its
    /// parent's identity children so ascending `sort_order` is restored.
    ///
    /// Assumes the remaining siblings are already ordered; this is not a
    /// full sibling sort. The node is placed after siblings with equal
    /// `sort_order` (stable).
    pub fn position_by_sort_order(&mut self, id: NodeId) -> TreeResult<()> {
        let (parent_id, sort_order) = {
            let node = self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))?;
            (node.parent_id, node.sort_order)
        };

        // Insertion index among the other siblings, computed before any
        // mutable borrow of the parent.
        let index = {
            let parent = self
                .nodes
                .get(&parent_id)
                .ok_or(TreeError::MissingParent(id))?;
            if !parent.children.contains(&id) {
                return Err(TreeError::MissingParent(id));
            }
            parent
                .children
                .iter()
                .filter(|&&child_id| child_id != id)
                .take_while(|&&child_id| {
                    self.nodes
                        .get(&child_id)
                        .is_some_and(|sibling| sibling.sort_order <= sort_order)
                })
                .count()
        };

        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or(TreeError::MissingParent(id))?;
        parent.children.retain(|&child_id| child_id != id);
        parent.children.insert(index, id);
        Ok(())
    }

    /// Recompute `level` and `path` for all descendants of a node from
    /// parent links, iteratively.
    ///
    /// Used after an in-place re-parent, where the moved node's own fields
    /// come from authoritative row data but its descendants still carry
    /// positions from the old location.
    pub fn refresh_subtree_positions(&mut self, id: NodeId) -> TreeResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::NodeNotFound(id));
        }

        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let (level, path, children) = {
                let node = self
                    .nodes
                    .get(&current)
                    .ok_or(TreeError::NodeNotFound(current))?;
                (node.level, node.path.clone(), node.children.clone())
            };
            for child_id in children {
                if let Some(child) = self.nodes.get_mut(&child_id) {
                    child.level = level + 1;
                    child.path = format!("{path},{child_id}");
                    queue.push_back(child_id);
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    /// Check the document's structural integrity.
    ///
    /// Verifies that every non-root node's parent exists and lists it as a
    /// child, that `level`/`path` are consistent with parent links, and
    /// that sibling `sort_order` values are non-decreasing.
    pub fn validate(&self) -> TreeResult<()> {
        for node in self.nodes.values() {
            if node.is_root() {
                continue;
            }
            let parent = self
                .nodes
                .get(&node.parent_id)
                .ok_or(TreeError::MissingParent(node.id))?;
            if !parent.children.contains(&node.id) {
                return Err(TreeError::MissingParent(node.id));
            }
            if node.level != parent.level + 1 {
                return Err(TreeError::Inconsistent {
                    node: node.id,
                    reason: format!(
                        "level {} does not follow parent level {}",
                        node.level, parent.level
                    ),
                });
            }
            let expected_path = format!("{},{}", parent.path, node.id);
            if node.path != expected_path {
                return Err(TreeError::Inconsistent {
                    node: node.id,
                    reason: format!("path {:?} != expected {:?}", node.path, expected_path),
                });
            }
        }

        // Sibling order: non-decreasing sort_order in document order.
        for node in self.nodes.values() {
            let mut previous: Option<i32> = None;
            for child in node.children.iter().filter_map(|id| self.nodes.get(id)) {
                if let Some(prev) = previous {
                    if child.sort_order < prev {
                        return Err(TreeError::Inconsistent {
                            node: child.id,
                            reason: format!(
                                "sort order {} breaks sibling ordering after {}",
                                child.sort_order, prev
                            ),
                        });
                    }
                }
                previous = Some(child.sort_order);
            }
        }

        Ok(())
    }

    /// Unlink `id` from `parent_id`'s child list.
    fn unlink(&mut self, id: NodeId, parent_id: NodeId) -> TreeResult<()> {
        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or(TreeError::MissingParent(id))?;
        let position = parent
            .children
            .iter()
            .position(|&child_id| child_id == id)
            .ok_or(TreeError::MissingParent(id))?;
        parent.children.remove(position);
        Ok(())
    }
}

impl Default for TreeDocument {
    fn default() -> Self {
        Self::new(TreeSchema::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(id: NodeId, parent_id: NodeId, level: u32, sort_order: i32) -> NodeFragment {
        let path = match parent_id {
            ROOT_ID => format!("{ROOT_ID},{id}"),
            _ => format!("{ROOT_ID},{parent_id},{id}"),
        };
        NodeFragment::new(id, parent_id, level, sort_order)
            .with_tag("page")
            .with_path(path)
    }

    /// root -> 1(sort 0) -> 2(sort 0), 3(sort 1)
    fn three_node_tree() -> TreeDocument {
        let mut doc = TreeDocument::new(TreeSchema::legacy());
        doc.append_child(ROOT_ID, fragment(1, ROOT_ID, 1, 0)).unwrap();
        doc.append_child(1, fragment(2, 1, 2, 0)).unwrap();
        doc.append_child(1, fragment(3, 1, 2, 1)).unwrap();
        doc
    }

    // ----------------------------------------------------------
    // Construction
    // ----------------------------------------------------------

    #[test]
    fn empty_document_has_only_root() {
        let doc = TreeDocument::default();
        assert!(doc.is_empty());
        assert_eq!(doc.len(), 0);
        assert!(doc.root().is_root());
        doc.validate().unwrap();
    }

    #[test]
    fn append_and_lookup() {
        let doc = three_node_tree();
        assert_eq!(doc.len(), 3);
        assert!(doc.contains(2));
        assert_eq!(doc.get(3).unwrap().parent_id, 1);
        assert_eq!(doc.get(3).unwrap().path, "-1,1,3");
        doc.validate().unwrap();
    }

    #[test]
    fn append_duplicate_id_is_rejected() {
        let mut doc = three_node_tree();
        let result = doc.append_child(ROOT_ID, fragment(1, ROOT_ID, 1, 5));
        assert_eq!(result, Err(TreeError::NodeExists(1)));
    }

    #[test]
    fn append_under_missing_parent_is_masked() {
        let mut doc = TreeDocument::default();
        let result = doc.append_child(99, fragment(5, 99, 2, 0));
        assert!(matches!(result, Err(TreeError::ParentNotFound { .. })));
        assert!(!doc.contains(5));
    }

    #[test]
    fn children_iteration_is_ordered() {
        let doc = three_node_tree();
        let ids: Vec<NodeId> = doc.children(1).map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn nodes_in_order_is_depth_first() {
        let mut doc = three_node_tree();
        doc.append_child(ROOT_ID, fragment(4, ROOT_ID, 1, 1)).unwrap();
        let ids: Vec<NodeId> = doc.nodes_in_order().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    // ----------------------------------------------------------
    // Removal
    // ----------------------------------------------------------

    #[test]
    fn remove_subtree_drops_descendants() {
        let mut doc = three_node_tree();
        let removed = doc.remove_subtree(1).unwrap();
        assert_eq!(removed, 3);
        assert!(doc.is_empty());
        doc.validate().unwrap();
    }

    #[test]
    fn remove_leaf_keeps_siblings() {
        let mut doc = three_node_tree();
        assert_eq!(doc.remove_subtree(2).unwrap(), 1);
        assert!(!doc.contains(2));
        let ids: Vec<NodeId> = doc.children(1).map(|n| n.id).collect();
        assert_eq!(ids, vec![3]);
        doc.validate().unwrap();
    }

    #[test]
    fn remove_missing_node() {
        let mut doc = three_node_tree();
        assert_eq!(doc.remove_subtree(42), Err(TreeError::NodeNotFound(42)));
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut doc = three_node_tree();
        assert_eq!(doc.remove_subtree(ROOT_ID), Err(TreeError::RootImmutable));
    }

    #[test]
    fn remove_with_broken_parent_link_is_integrity_error() {
        let mut doc = three_node_tree();
        // Corrupt the parent link directly.
        doc.get_mut(3).unwrap().parent_id = 77;
        assert_eq!(doc.remove_subtree(3), Err(TreeError::MissingParent(3)));
    }

    // ----------------------------------------------------------
    // Reattach
    // ----------------------------------------------------------

    #[test]
    fn reattach_moves_subtree() {
        let mut doc = three_node_tree();
        doc.append_child(ROOT_ID, fragment(4, ROOT_ID, 1, 1)).unwrap();

        doc.reattach(2, 4).unwrap();
        let node = doc.get(2).unwrap();
        assert_eq!(node.parent_id, 4);
        assert_eq!(doc.children(4).count(), 1);
        assert_eq!(doc.children(1).count(), 1);
    }

    #[test]
    fn reattach_then_refresh_restores_invariants() {
        let mut doc = three_node_tree();
        doc.append_child(2, fragment(10, 2, 3, 0)).unwrap();
        doc.append_child(ROOT_ID, fragment(4, ROOT_ID, 1, 1)).unwrap();

        doc.reattach(2, 4).unwrap();
        {
            let node = doc.get_mut(2).unwrap();
            node.level = 2;
            node.path = "-1,4,2".to_string();
        }
        doc.refresh_subtree_positions(2).unwrap();

        assert_eq!(doc.get(10).unwrap().level, 3);
        assert_eq!(doc.get(10).unwrap().path, "-1,4,2,10");
        doc.validate().unwrap();
    }

    #[test]
    fn reattach_to_missing_parent_is_masked() {
        let mut doc = three_node_tree();
        let result = doc.reattach(2, 99);
        assert!(matches!(result, Err(TreeError::ParentNotFound { .. })));
        // Unchanged on failure.
        assert_eq!(doc.get(2).unwrap().parent_id, 1);
        doc.validate().unwrap();
    }

    // ----------------------------------------------------------
    // Sort-order positioning
    // ----------------------------------------------------------

    #[test]
    fn position_by_sort_order_corrects_one_node() {
        let mut doc = TreeDocument::default();
        doc.append_child(ROOT_ID, fragment(1, ROOT_ID, 1, 0)).unwrap();
        doc.append_child(ROOT_ID, fragment(2, ROOT_ID, 1, 1)).unwrap();
        doc.append_child(ROOT_ID, fragment(3, ROOT_ID, 1, 2)).unwrap();

        // Node 3 changes its sort order to the front.
        doc.get_mut(3).unwrap().sort_order = -1;
        doc.position_by_sort_order(3).unwrap();

        let ids: Vec<NodeId> = doc.children(ROOT_ID).map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        doc.validate().unwrap();
    }

    #[test]
    fn position_is_stable_for_equal_sort_orders() {
        let mut doc = TreeDocument::default();
        doc.append_child(ROOT_ID, fragment(1, ROOT_ID, 1, 0)).unwrap();
        doc.append_child(ROOT_ID, fragment(2, ROOT_ID, 1, 0)).unwrap();
        doc.append_child(ROOT_ID, fragment(3, ROOT_ID, 1, 1)).unwrap();

        // Re-position node 1 with an unchanged sort order: it lands after
        // its equal sibling, before the greater one.
        doc.position_by_sort_order(1).unwrap();
        let ids: Vec<NodeId> = doc.children(ROOT_ID).map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    // ----------------------------------------------------------
    // Validation
    // ----------------------------------------------------------

    #[test]
    fn validate_detects_bad_level() {
        let mut doc = three_node_tree();
        doc.get_mut(3).unwrap().level = 7;
        assert!(matches!(
            doc.validate(),
            Err(TreeError::Inconsistent { node: 3, .. })
        ));
    }

    #[test]
    fn validate_detects_bad_path() {
        let mut doc = three_node_tree();
        doc.get_mut(2).unwrap().path = "-1,9,2".to_string();
        assert!(matches!(
            doc.validate(),
            Err(TreeError::Inconsistent { node: 2, .. })
        ));
    }

    #[test]
    fn validate_detects_sibling_disorder() {
        let mut doc = three_node_tree();
        doc.get_mut(2).unwrap().sort_order = 9;
        assert!(matches!(
            doc.validate(),
            Err(TreeError::Inconsistent { .. })
        ));
    }

    // ----------------------------------------------------------
    // Cloning & serialization
    // ----------------------------------------------------------

    #[test]
    fn clone_is_structural() {
        let doc = three_node_tree();
        let mut cloned = doc.clone();
        cloned.remove_subtree(2).unwrap();

        // The original is untouched.
        assert!(doc.contains(2));
        assert!(!cloned.contains(2));
    }

    #[test]
    fn serde_roundtrip_preserves_structure() {
        let doc = three_node_tree();
        let text = serde_json::to_string_pretty(&doc).unwrap();
        let restored: TreeDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(doc, restored);
        restored.validate().unwrap();
    }

    // ----------------------------------------------------------
    // Property: single-element correction keeps siblings ordered
    // ----------------------------------------------------------

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn positioned_inserts_keep_sibling_order(orders in proptest::collection::vec(-100i32..100, 1..24)) {
                let mut doc = TreeDocument::default();
                for (index, sort_order) in orders.iter().enumerate() {
                    let id = index as NodeId + 1;
                    doc.append_child(ROOT_ID, fragment(id, ROOT_ID, 1, *sort_order)).unwrap();
                    doc.position_by_sort_order(id).unwrap();
                }

                let sorted: Vec<i32> = doc.children(ROOT_ID).map(|n| n.sort_order).collect();
                prop_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }
}

//! Node types for the content tree.
//!
//! A [`Node`] is an identity-keyed element of a [`TreeDocument`]: it carries
//! the positional fields mirrored from the relational store (`parent_id`,
//! `level`, `path`, `sort_order`), a monotonic `revision` used for cheap
//! staleness checks, an attribute map, ordered data elements (field values),
//! and the ordered list of identity children.
//!
//! A [`NodeFragment`] is the serializer's output for a single item: the same
//! content without identity children. Fragments are what the row source
//! delivers and what the patcher grafts into a live tree.
//!
//! [`TreeDocument`]: crate::document::TreeDocument

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Identity of a node, unique across a document.
pub type NodeId = i64;

/// Id of the synthetic root node present in every document.
pub const ROOT_ID: NodeId = -1;

/// A single identity-keyed node in the content tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identity within the document.
    pub id: NodeId,
    /// Identity of the parent node (`ROOT_ID` for top-level content).
    pub parent_id: NodeId,
    /// Depth in the tree; the root's children are at level 1.
    pub level: u32,
    /// Comma-separated ancestor-id chain, e.g. `-1,5,7`.
    pub path: String,
    /// Defines ordering among siblings (ascending).
    pub sort_order: i32,
    /// Monotonic counter bumped on every content update.
    pub revision: u64,
    /// Content-type alias.
    pub tag: String,
    /// Attribute map.
    pub attributes: BTreeMap<String, String>,
    /// Ordered non-identity children holding field values.
    pub data: Vec<DataElement>,
    /// Ordered identity children (sub-nodes).
    pub children: Vec<NodeId>,
}

impl Node {
    /// Materialize a fragment as a node with no identity children.
    pub fn from_fragment(fragment: NodeFragment) -> Self {
        Self {
            id: fragment.id,
            parent_id: fragment.parent_id,
            level: fragment.level,
            path: fragment.path,
            sort_order: fragment.sort_order,
            revision: fragment.revision,
            tag: fragment.tag,
            attributes: fragment.attributes,
            data: fragment.data,
            children: Vec::new(),
        }
    }

    /// The synthetic root node.
    pub(crate) fn root() -> Self {
        Self {
            id: ROOT_ID,
            parent_id: ROOT_ID,
            level: 0,
            path: ROOT_ID.to_string(),
            sort_order: 0,
            revision: 0,
            tag: "root".to_string(),
            attributes: BTreeMap::new(),
            data: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns `true` if this is the synthetic root.
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Replace content fields from a fragment, keeping identity children.
    ///
    /// Attributes and data elements are replaced wholesale; the positional
    /// fields (`parent_id`, `level`, `path`, `sort_order`) and `revision`
    /// are taken from the fragment as the new authoritative values. The
    /// child list is untouched.
    pub fn update_from_fragment(&mut self, fragment: NodeFragment) {
        self.parent_id = fragment.parent_id;
        self.level = fragment.level;
        self.path = fragment.path;
        self.sort_order = fragment.sort_order;
        self.revision = fragment.revision;
        self.tag = fragment.tag;
        self.attributes = fragment.attributes;
        self.data = fragment.data;
    }
}

/// A serialized content item: one node's content without identity children.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFragment {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub level: u32,
    pub path: String,
    pub sort_order: i32,
    pub revision: u64,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub data: Vec<DataElement>,
}

impl NodeFragment {
    /// Convenience constructor for the positional skeleton of a fragment.
    pub fn new(id: NodeId, parent_id: NodeId, level: u32, sort_order: i32) -> Self {
        let path = if parent_id == ROOT_ID {
            format!("{ROOT_ID},{id}")
        } else {
            // Callers that know the full ancestor chain overwrite this.
            format!("{parent_id},{id}")
        };
        Self {
            id,
            parent_id,
            level,
            path,
            sort_order,
            revision: 0,
            tag: String::new(),
            attributes: BTreeMap::new(),
            data: Vec::new(),
        }
    }

    /// Set the content-type alias.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set the ancestor-id chain.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the revision counter.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Add one attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add one data element.
    pub fn with_data(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.push(DataElement {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// A non-identity child element holding a single field value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElement {
    pub name: String,
    pub value: String,
}

/// The document's schema declaration: the doctype-equivalent placeholder.
///
/// Non-legacy schemas track the set of declared content-type aliases so a
/// fragment with a new tag can be declared idempotently before insertion.
/// Legacy schemas accept any tag without declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSchema {
    /// Legacy mode: no per-tag declarations are maintained.
    pub legacy: bool,
    /// Declared content-type aliases (non-legacy only).
    pub declared: BTreeSet<String>,
}

impl TreeSchema {
    /// A non-legacy schema with the given declared aliases.
    pub fn with_declared<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            legacy: false,
            declared: aliases.into_iter().map(Into::into).collect(),
        }
    }

    /// A legacy schema that accepts any tag.
    pub fn legacy() -> Self {
        Self {
            legacy: true,
            declared: BTreeSet::new(),
        }
    }

    /// Returns `true` if the tag is acceptable under this schema.
    pub fn declares(&self, tag: &str) -> bool {
        self.legacy || self.declared.contains(tag)
    }

    /// Declare a tag if not already declared. Returns `true` if it was new.
    pub fn ensure_declared(&mut self, tag: &str) -> bool {
        if self.legacy {
            return false;
        }
        self.declared.insert(tag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_builder_chain() {
        let fragment = NodeFragment::new(7, 5, 2, 3)
            .with_tag("article")
            .with_path("-1,5,7")
            .with_revision(12)
            .with_attribute("urlName", "hello")
            .with_data("title", "Hello");

        assert_eq!(fragment.id, 7);
        assert_eq!(fragment.parent_id, 5);
        assert_eq!(fragment.level, 2);
        assert_eq!(fragment.sort_order, 3);
        assert_eq!(fragment.path, "-1,5,7");
        assert_eq!(fragment.revision, 12);
        assert_eq!(fragment.tag, "article");
        assert_eq!(fragment.attributes.get("urlName").unwrap(), "hello");
        assert_eq!(fragment.data[0].name, "title");
    }

    #[test]
    fn node_from_fragment_has_no_children() {
        let node = Node::from_fragment(NodeFragment::new(1, ROOT_ID, 1, 0).with_tag("page"));
        assert_eq!(node.id, 1);
        assert_eq!(node.parent_id, ROOT_ID);
        assert!(node.children.is_empty());
        assert!(!node.is_root());
    }

    #[test]
    fn update_from_fragment_keeps_children() {
        let mut node = Node::from_fragment(NodeFragment::new(1, ROOT_ID, 1, 0).with_tag("page"));
        node.children = vec![10, 11];

        node.update_from_fragment(
            NodeFragment::new(1, ROOT_ID, 1, 4)
                .with_tag("article")
                .with_revision(9)
                .with_data("body", "text"),
        );

        assert_eq!(node.tag, "article");
        assert_eq!(node.sort_order, 4);
        assert_eq!(node.revision, 9);
        assert_eq!(node.data.len(), 1);
        assert_eq!(node.children, vec![10, 11]);
    }

    #[test]
    fn root_node_shape() {
        let root = Node::root();
        assert!(root.is_root());
        assert_eq!(root.level, 0);
        assert_eq!(root.path, "-1");
    }

    #[test]
    fn schema_declaration_is_idempotent() {
        let mut schema = TreeSchema::with_declared(["page"]);
        assert!(schema.declares("page"));
        assert!(!schema.declares("article"));

        assert!(schema.ensure_declared("article"));
        assert!(!schema.ensure_declared("article"));
        assert!(schema.declares("article"));
    }

    #[test]
    fn legacy_schema_accepts_anything() {
        let mut schema = TreeSchema::legacy();
        assert!(schema.declares("whatever"));
        // Declaration is a no-op in legacy mode.
        assert!(!schema.ensure_declared("whatever"));
        assert!(schema.declared.is_empty());
    }
}

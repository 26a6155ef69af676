//! In-memory ordered content tree for the canopy cache.
//!
//! This crate implements the tree document that the cache publishes to
//! readers: identity-keyed nodes with attribute maps and ordered data
//! elements, mirrored from a relational store.
//!
//! # Design Rules
//!
//! 1. Identity lookup goes through an explicit id → node map, never
//!    through structural traversal.
//! 2. Traversals are iterative; deep trees cannot exhaust the stack.
//! 3. A published document is immutable by convention: all structural
//!    change happens on a private clone before publication.
//! 4. `level` and `path` always agree with parent links after a public
//!    mutation sequence completes; [`TreeDocument::validate`] checks this.

pub mod document;
pub mod error;
pub mod node;

// Re-export primary types at crate root for ergonomic imports.
pub use document::TreeDocument;
pub use error::{TreeError, TreeResult};
pub use node::{DataElement, Node, NodeFragment, NodeId, TreeSchema, ROOT_ID};

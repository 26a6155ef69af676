//! Bulk tree construction from an ordered row stream.
//!
//! The loader makes a single iterative pass over rows ordered by
//! `(level, sort_order)`: because parents sort before their children, the
//! document's own id index doubles as the parent map and no recursion or
//! second pass is needed.
//!
//! A row whose parent has not been materialized is **dropped, not queued**
//! -- the masked-subtree behavior of the source system is preserved, and
//! the drop is logged so it is at least observable.

use tracing::{debug, warn};

use canopy_tree::{TreeDocument, TreeError, TreeSchema, NodeId};

use crate::error::SourceResult;
use crate::row::NodeRow;
use crate::traits::RowSource;

/// Build a full document from the source's ordered content rows.
pub fn load_full(source: &dyn RowSource, schema: TreeSchema) -> SourceResult<TreeDocument> {
    let rows = source.content_rows()?;
    let total = rows.len();
    let mut document = TreeDocument::new(schema);
    let mut dropped = 0usize;

    for row in rows {
        if !row.published {
            debug!(id = row.id, "unpublished row skipped");
            continue;
        }
        let parent_id = row.parent_id;
        match document.append_child(parent_id, row.into_fragment()) {
            Ok(_) => {}
            Err(TreeError::ParentNotFound { node, parent }) => {
                warn!(id = node, parent, "row parent not materialized; row dropped");
                dropped += 1;
            }
            Err(other) => return Err(other.into()),
        }
    }

    debug!(total, loaded = document.len(), dropped, "full load complete");
    Ok(document)
}

/// Fetch the ordered row stream for the subtree rooted at `id`.
///
/// The per-row fragment construction happens at the consumer via
/// [`NodeRow::into_fragment`]; integrity checks on the first row belong to
/// the caller.
pub fn load_branch(source: &dyn RowSource, id: NodeId, path: &str) -> SourceResult<Vec<NodeRow>> {
    let rows = source.branch_rows(id, path)?;
    debug!(id, rows = rows.len(), "branch rows fetched");
    Ok(rows)
}

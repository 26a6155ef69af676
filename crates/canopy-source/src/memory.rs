use std::collections::HashMap;
use std::sync::RwLock;

use canopy_tree::NodeId;

use crate::error::SourceResult;
use crate::row::{ItemState, NodeRow};
use crate::traits::RowSource;

/// In-memory, HashMap-backed row source.
///
/// Intended for tests and embedding. Rows are held behind a `RwLock` and
/// cloned on query; ordering is computed per query so callers always see
/// `(level, sort_order)` ascending regardless of insertion order.
pub struct InMemoryRowSource {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<NodeId, NodeRow>,
    states: HashMap<NodeId, ItemState>,
}

impl InMemoryRowSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert or replace a row, marking the item published at its path.
    pub fn upsert(&self, row: NodeRow) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.states.insert(row.id, ItemState::published_at(row.path.clone()));
        inner.rows.insert(row.id, row);
    }

    /// Remove a row and forget the item entirely.
    pub fn remove(&self, id: NodeId) -> bool {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.states.remove(&id);
        inner.rows.remove(&id).is_some()
    }

    /// Override an item's domain state without touching its row.
    pub fn set_item_state(&self, id: NodeId, state: ItemState) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.states.insert(id, state);
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").rows.len()
    }

    /// Returns `true` if no rows are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRowSource {
    fn default() -> Self {
        Self::new()
    }
}

fn ordered(mut rows: Vec<NodeRow>) -> Vec<NodeRow> {
    rows.sort_by_key(|row| (row.level, row.sort_order, row.id));
    rows
}

impl RowSource for InMemoryRowSource {
    fn content_rows(&self) -> SourceResult<Vec<NodeRow>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(ordered(inner.rows.values().cloned().collect()))
    }

    fn branch_rows(&self, id: NodeId, path: &str) -> SourceResult<Vec<NodeRow>> {
        let prefix = format!("{path},");
        let inner = self.inner.read().expect("lock poisoned");
        let rows = inner
            .rows
            .values()
            .filter(|row| row.id == id || row.path == path || row.path.starts_with(&prefix))
            .cloned()
            .collect();
        Ok(ordered(rows))
    }

    fn item_state(&self, id: NodeId) -> SourceResult<Option<ItemState>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.states.get(&id).cloned())
    }
}

impl std::fmt::Debug for InMemoryRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRowSource")
            .field("row_count", &self.len())
            .finish()
    }
}

//! Route-resolution cache.
//!
//! Derived from the live tree and therefore keyed off tree identity: every
//! commit clears it wholesale, and downstream resolution logic repopulates
//! it lazily against the new snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use canopy_tree::NodeId;

/// Id → resolved route, cleared on every commit.
#[derive(Default)]
pub struct RouteCache {
    routes: RwLock<HashMap<NodeId, String>>,
}

impl RouteCache {
    /// Create an empty route cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached route.
    pub fn resolve(&self, id: NodeId) -> Option<String> {
        self.routes.read().expect("lock poisoned").get(&id).cloned()
    }

    /// Cache a resolved route.
    pub fn store(&self, id: NodeId, route: impl Into<String>) {
        self.routes
            .write()
            .expect("lock poisoned")
            .insert(id, route.into());
    }

    /// Drop all cached routes.
    pub fn clear(&self) {
        self.routes.write().expect("lock poisoned").clear();
    }

    /// Number of cached routes.
    pub fn len(&self) -> usize {
        self.routes.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCache").field("len", &self.len()).finish()
    }
}

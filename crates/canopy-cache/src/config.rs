use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use canopy_tree::TreeSchema;

use crate::error::{CacheError, CacheResult};

/// Configuration for the content cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Schema declaration for freshly built documents, derived externally.
    pub schema: TreeSchema,
    /// Location of the on-disk snapshot file, if any.
    pub snapshot_path: Option<PathBuf>,
    /// Persist the tree to the snapshot file on every registered commit.
    pub sync_on_write: bool,
    /// Watch the snapshot file for out-of-process writers and reload from
    /// it when it changes. Mutually exclusive with `sync_on_write`.
    pub poll_disk_changes: bool,
    /// Rate limit for snapshot staleness checks.
    pub poll_interval: Duration,
    /// Defer commit-time persistence to a background flush task instead of
    /// writing inline. Requires a tokio runtime.
    pub background_flush: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            schema: TreeSchema::default(),
            snapshot_path: None,
            sync_on_write: false,
            poll_disk_changes: false,
            poll_interval: Duration::from_secs(1),
            background_flush: false,
        }
    }
}

impl CacheConfig {
    /// Check the configuration for fatal conflicts.
    pub fn validate(&self) -> CacheResult<()> {
        if self.sync_on_write && self.poll_disk_changes {
            return Err(CacheError::ConfigConflict(
                "continuous disk sync and disk-change polling cannot both be enabled".into(),
            ));
        }
        if (self.sync_on_write || self.poll_disk_changes) && self.snapshot_path.is_none() {
            return Err(CacheError::ConfigConflict(
                "disk synchronization requires a snapshot path".into(),
            ));
        }
        Ok(())
    }
}

//! Whole-file snapshot persistence.
//!
//! The synchronizer writes the live tree to a single UTF-8 text file in
//! canonical form (ordered maps, stable indentation) and reads it back on
//! startup. Writes are whole-file, delete-then-write; a failure mid-write
//! deletes the target so a partial snapshot never survives. A corrupt file
//! found on load is likewise deleted, and the caller falls back to the
//! database load path.
//!
//! Out-of-process writers are detected by comparing the file's
//! modification time against the timestamp of the last successful
//! load/save, rate-limited so the filesystem is polled at most once per
//! interval.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use canopy_tree::TreeDocument;

use crate::error::{SnapshotError, SnapshotResult};

/// Default rate limit for staleness polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Persists and loads the content tree snapshot file.
pub struct FileSynchronizer {
    path: PathBuf,
    poll_interval: Duration,
    poll: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    /// File mtime observed at the last successful load or save.
    last_read: Option<SystemTime>,
    /// When the filesystem was last actually polled.
    last_check: Option<Instant>,
    /// Result of the last poll, served while rate-limited.
    cached_stale: bool,
}

impl FileSynchronizer {
    /// Create a synchronizer for the given snapshot path.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            poll: Mutex::new(PollState::default()),
        }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the tree to canonical text and write it whole-file.
    ///
    /// The previous file is deleted first; on any failure the target is
    /// deleted again, so a partial snapshot never survives
    /// (fail-safe-by-absence).
    pub fn save(&self, tree: &TreeDocument) -> SnapshotResult<()> {
        let text = serde_json::to_string_pretty(tree)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if let Err(error) = self.write_whole_file(&text) {
            let _ = fs::remove_file(&self.path);
            return Err(error);
        }

        self.mark_read();
        debug!(path = %self.path.display(), bytes = text.len(), "snapshot saved");
        Ok(())
    }

    /// Load the tree from the snapshot file.
    ///
    /// Returns `Ok(None)` if the file is absent, or if it is unreadable or
    /// corrupt -- in which case the offending file is deleted so it is not
    /// parsed again, and the caller falls back to the database load path.
    pub fn load(&self) -> SnapshotResult<Option<TreeDocument>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "snapshot unreadable; removing");
                let _ = fs::remove_file(&self.path);
                return Ok(None);
            }
        };

        match serde_json::from_str::<TreeDocument>(&text) {
            Ok(tree) => {
                self.mark_read();
                debug!(path = %self.path.display(), nodes = tree.len(), "snapshot loaded");
                Ok(Some(tree))
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "snapshot corrupt; removing");
                let _ = fs::remove_file(&self.path);
                Ok(None)
            }
        }
    }

    /// Returns `true` if the file on disk is newer than what was last
    /// loaded or saved through this synchronizer.
    ///
    /// The filesystem is polled at most once per configured interval; in
    /// between, the previous answer is served.
    pub fn is_stale(&self) -> bool {
        let mut poll = self.poll.lock().expect("poll lock poisoned");

        if let Some(last_check) = poll.last_check {
            if last_check.elapsed() < self.poll_interval {
                return poll.cached_stale;
            }
        }

        let stale = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => match poll.last_read {
                Some(last_read) => modified > last_read,
                None => true,
            },
            // Absent file: nothing newer to pick up.
            Err(_) => false,
        };

        poll.last_check = Some(Instant::now());
        poll.cached_stale = stale;
        stale
    }

    fn write_whole_file(&self, text: &str) -> SnapshotResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }

        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Record the file's current mtime as the last-read timestamp.
    fn mark_read(&self) {
        let mut poll = self.poll.lock().expect("poll lock poisoned");
        poll.last_read = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok();
        poll.cached_stale = false;
        poll.last_check = Some(Instant::now());
    }
}

impl std::fmt::Debug for FileSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSynchronizer")
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

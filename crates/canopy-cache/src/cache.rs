//! The content cache facade.
//!
//! Wires the snapshot cell, writer lock, route cache, row source and file
//! synchronizer together behind a small API: `read` for lock-free
//! captures, `write`/`write_async` for clone-on-write mutation, `reload`
//! for an explicit full rebuild, and `ensure_fresh` for the disk-polling
//! deployment mode.
//!
//! Bootstrap order: the disk snapshot when one is configured and loads
//! cleanly, otherwise a full build from the row source (persisted right
//! away when sync-on-write is enabled, so the next start can skip the
//! database).

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use canopy_snapshot::FileSynchronizer;
use canopy_source::{loader, RowSource};
use canopy_tree::TreeDocument;

use crate::cell::SnapshotCell;
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::handle::{ReadHandle, WriteHandle};
use crate::lock::SnapshotLock;
use crate::routes::RouteCache;

type PendingFlush = Arc<Mutex<Option<Arc<TreeDocument>>>>;

/// In-process cache of the content tree.
pub struct ContentCache {
    config: CacheConfig,
    source: Arc<dyn RowSource>,
    lock: SnapshotLock,
    cell: SnapshotCell,
    routes: RouteCache,
    synchronizer: Option<Arc<FileSynchronizer>>,
    pending_flush: PendingFlush,
    flush_signal: Option<mpsc::UnboundedSender<()>>,
}

impl ContentCache {
    /// Validate the configuration, bootstrap the live tree, and start the
    /// background flush task if configured.
    ///
    /// Background flushing requires a tokio runtime to be present.
    pub fn new(config: CacheConfig, source: Arc<dyn RowSource>) -> CacheResult<Self> {
        config.validate()?;

        let synchronizer = config
            .snapshot_path
            .as_ref()
            .map(|path| Arc::new(FileSynchronizer::new(path.clone(), config.poll_interval)));

        let mut from_disk = false;
        let tree = match &synchronizer {
            Some(sync) => match sync.load()? {
                Some(tree) => {
                    from_disk = true;
                    tree
                }
                None => loader::load_full(&*source, config.schema.clone())?,
            },
            None => loader::load_full(&*source, config.schema.clone())?,
        };

        let pending_flush: PendingFlush = Arc::new(Mutex::new(None));
        let flush_signal = match &synchronizer {
            Some(sync) if config.sync_on_write && config.background_flush => Some(
                spawn_flush_task(Arc::clone(sync), Arc::clone(&pending_flush)),
            ),
            _ => None,
        };

        let cache = Self {
            config,
            source,
            lock: SnapshotLock::new(),
            cell: SnapshotCell::new(tree),
            routes: RouteCache::new(),
            synchronizer,
            pending_flush,
            flush_signal,
        };

        // A tree built from the database is persisted right away, so the
        // next start can boot from disk.
        if !from_disk && cache.config.sync_on_write {
            if let Some(sync) = &cache.synchronizer {
                if let Err(error) = sync.save(&cache.current()) {
                    warn!(%error, "initial snapshot save failed");
                }
            }
        }

        info!(nodes = cache.current().len(), from_disk, "content cache started");
        Ok(cache)
    }

    /// The current live tree. Lock-free; safe to keep indefinitely.
    pub fn current(&self) -> Arc<TreeDocument> {
        self.cell.current()
    }

    /// Open a read handle over the current live tree.
    pub fn read(&self) -> ReadHandle {
        ReadHandle::new(self.cell.current())
    }

    /// Open a write handle, blocking until the writer lock is free.
    ///
    /// For synchronous call sites only; async call sites use
    /// [`write_async`](Self::write_async).
    pub fn write(&self, auto_commit: bool) -> WriteHandle<'_> {
        let guard = self.lock.acquire();
        WriteHandle::new(self, guard, auto_commit)
    }

    /// Open a write handle, suspending until the writer lock is free.
    pub async fn write_async(&self, auto_commit: bool) -> WriteHandle<'_> {
        let guard = self.lock.acquire_async().await;
        WriteHandle::new(self, guard, auto_commit)
    }

    /// Explicit full rebuild from the row source.
    ///
    /// For callers that need guaranteed-fresh data after an out-of-band
    /// rebuild; the swap is atomic like any other commit.
    pub fn reload(&self) -> CacheResult<()> {
        let mut handle = self.write(false);
        *handle.tree_mut() = loader::load_full(&*self.source, self.config.schema.clone())?;
        handle.commit(true);
        Ok(())
    }

    /// In disk-polling mode, reload from the snapshot file if an
    /// out-of-process writer has replaced it.
    ///
    /// Returns `true` if a newer tree was published. A snapshot that turns
    /// out corrupt falls back to a database rebuild.
    pub fn ensure_fresh(&self) -> CacheResult<bool> {
        if !self.config.poll_disk_changes {
            return Ok(false);
        }
        let Some(sync) = &self.synchronizer else {
            return Ok(false);
        };
        if !sync.is_stale() {
            return Ok(false);
        }

        let mut handle = self.write(false);
        let tree = match sync.load()? {
            Some(tree) => tree,
            None => loader::load_full(&*self.source, self.config.schema.clone())?,
        };
        *handle.tree_mut() = tree;
        // What came from disk does not go back to disk.
        handle.commit(false);
        debug!("stale snapshot reloaded");
        Ok(true)
    }

    /// Write any deferred snapshot now.
    pub fn flush(&self) -> CacheResult<()> {
        let Some(sync) = &self.synchronizer else {
            return Ok(());
        };
        let pending = self.pending_flush.lock().expect("flush lock poisoned").take();
        if let Some(tree) = pending {
            sync.save(&tree)?;
        }
        Ok(())
    }

    /// The route-resolution cache derived from the live tree.
    pub fn routes(&self) -> &RouteCache {
        &self.routes
    }

    /// The row source this cache mirrors.
    pub fn source(&self) -> &Arc<dyn RowSource> {
        &self.source
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Publish a finished clone as the new live tree.
    ///
    /// Called only from a write handle, which holds the writer lock.
    pub(crate) fn install(&self, tree: TreeDocument, register_change: bool) {
        let tree = Arc::new(tree);
        self.cell.swap(Arc::clone(&tree));
        self.routes.clear();
        debug!(nodes = tree.len(), "live tree swapped");

        if !register_change || !self.config.sync_on_write {
            return;
        }
        let Some(sync) = &self.synchronizer else {
            return;
        };
        if let Some(signal) = &self.flush_signal {
            // Deferred: the background task picks up the latest tree.
            *self.pending_flush.lock().expect("flush lock poisoned") = Some(tree);
            let _ = signal.send(());
        } else if let Err(error) = sync.save(&tree) {
            warn!(%error, "snapshot save failed; file removed");
        }
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("nodes", &self.current().len())
            .field("sync_on_write", &self.config.sync_on_write)
            .field("poll_disk_changes", &self.config.poll_disk_changes)
            .finish()
    }
}

/// Drain deferred snapshot writes on a background task.
fn spawn_flush_task(
    sync: Arc<FileSynchronizer>,
    pending: PendingFlush,
) -> mpsc::UnboundedSender<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let tree = pending.lock().expect("flush lock poisoned").take();
            if let Some(tree) = tree {
                if let Err(error) = sync.save(&tree) {
                    warn!(%error, "background snapshot save failed");
                }
            }
        }
    });
    tx
}

//! Change ingestion and dependent-cache resync.
//!
//! One notifier exists per cache, created at startup and torn down on
//! disposal. External transports hand it batches of change descriptors --
//! directly via [`notify`], or through a channel endpoint obtained from
//! [`subscribe`] and drained by a background task. Each batch runs under
//! one non-auto-commit write handle and commits at most once; dependent
//! caches (routes, cross-instance resync hooks) react only to an actual
//! change.
//!
//! Type-schema changes arrive as their own payload tree: any full-reload
//! entry invalidates everything, otherwise the changed alias set is
//! flattened transitively and every node carrying one of those tags gets
//! a branch refresh.
//!
//! [`notify`]: ChangeNotifier::notify
//! [`subscribe`]: ChangeNotifier::subscribe

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use canopy_tree::TreeDocument;

use crate::cache::ContentCache;
use crate::error::{CacheError, CacheResult};
use crate::handle::WriteHandle;
use crate::patcher::{ChangeDescriptor, IncrementalPatcher};

/// Callback fired with the freshly published tree after a real change.
pub type ResyncHook = Box<dyn Fn(&TreeDocument) + Send + Sync>;

/// How a content-type schema entry changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaChangeKind {
    /// Structural change invalidating the whole tree.
    Full,
    /// Content of this type must be reloaded.
    Targeted,
}

/// A type-schema change payload, possibly carrying descendant types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub alias: String,
    pub kind: SchemaChangeKind,
    pub descendants: Vec<SchemaChange>,
}

impl SchemaChange {
    /// A full-reload change.
    pub fn full(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            kind: SchemaChangeKind::Full,
            descendants: Vec::new(),
        }
    }

    /// A targeted change with optional descendant payloads.
    pub fn targeted(alias: impl Into<String>, descendants: Vec<SchemaChange>) -> Self {
        Self {
            alias: alias.into(),
            kind: SchemaChangeKind::Targeted,
            descendants,
        }
    }
}

/// Routes change batches into the patcher and fires resync side effects.
pub struct ChangeNotifier {
    cache: Arc<ContentCache>,
    patcher: IncrementalPatcher,
    hooks: RwLock<Vec<ResyncHook>>,
    shut_down: AtomicBool,
    ingest_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeNotifier {
    /// Create the notifier for a cache. One per cache, at startup.
    pub fn new(cache: Arc<ContentCache>) -> Arc<Self> {
        let patcher = IncrementalPatcher::new(Arc::clone(cache.source()));
        Arc::new(Self {
            cache,
            patcher,
            hooks: RwLock::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            ingest_task: Mutex::new(None),
        })
    }

    /// Register a cross-instance resync endpoint.
    ///
    /// Hooks run after a batch actually changed the published tree, with
    /// the writer lock already released.
    pub fn register_resync_hook(&self, hook: ResyncHook) {
        self.hooks.write().expect("hooks lock poisoned").push(hook);
    }

    /// Apply one change batch, blocking on the writer lock.
    ///
    /// Returns whether the cache's published content changed. A failed
    /// batch discards its clone and leaves the cache at its last
    /// consistent state.
    pub fn notify(&self, batch: &[ChangeDescriptor]) -> CacheResult<bool> {
        if self.is_shut_down() {
            return Err(CacheError::Shutdown);
        }
        if batch.is_empty() {
            return Ok(false);
        }
        let handle = self.cache.write(false);
        self.run_batch(handle, batch)
    }

    /// Apply one change batch, suspending on the writer lock.
    pub async fn notify_async(&self, batch: &[ChangeDescriptor]) -> CacheResult<bool> {
        if self.is_shut_down() {
            return Err(CacheError::Shutdown);
        }
        if batch.is_empty() {
            return Ok(false);
        }
        let handle = self.cache.write_async(false).await;
        self.run_batch(handle, batch)
    }

    /// Handle a batch of type-schema changes.
    ///
    /// Any [`SchemaChangeKind::Full`] entry anywhere in the payload tree
    /// triggers a full reload; otherwise every node whose tag is in the
    /// transitively flattened alias set gets a branch refresh.
    pub fn notify_schema_change(&self, changes: &[SchemaChange]) -> CacheResult<bool> {
        let mut aliases = BTreeSet::new();
        if flatten_changes(changes, &mut aliases) {
            return self.notify(&[ChangeDescriptor::refresh_all()]);
        }
        if aliases.is_empty() {
            return Ok(false);
        }

        let current = self.cache.current();
        let batch: Vec<ChangeDescriptor> = current
            .nodes_in_order()
            .iter()
            .filter(|node| aliases.contains(&node.tag))
            .map(|node| ChangeDescriptor::refresh_branch(node.id))
            .collect();
        if batch.is_empty() {
            return Ok(false);
        }
        self.notify(&batch)
    }

    /// Obtain a channel endpoint delivering batches to this notifier.
    ///
    /// A background task drains the channel and applies each batch; it
    /// ends when every sender is dropped or the notifier shuts down.
    /// Requires a tokio runtime.
    pub fn subscribe(self: &Arc<Self>) -> mpsc::UnboundedSender<Vec<ChangeDescriptor>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<ChangeDescriptor>>();
        let notifier = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                if notifier.is_shut_down() {
                    break;
                }
                if let Err(error) = notifier.notify_async(&batch).await {
                    warn!(%error, "change batch failed; cache left at last consistent state");
                }
            }
        });
        *self.ingest_task.lock().expect("task lock poisoned") = Some(task);
        tx
    }

    /// Tear down: refuse further batches, stop ingestion, drop all hooks.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(task) = self.ingest_task.lock().expect("task lock poisoned").take() {
            task.abort();
        }
        self.hooks.write().expect("hooks lock poisoned").clear();
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn run_batch(&self, mut handle: WriteHandle<'_>, batch: &[ChangeDescriptor]) -> CacheResult<bool> {
        let changed = self.patcher.apply(handle.tree_mut(), batch)?;
        if !changed {
            return Ok(false);
        }

        handle.commit(true);
        drop(handle);

        // Dependent caches resync against the published tree, outside the
        // writer lock.
        let current = self.cache.current();
        for hook in self.hooks.read().expect("hooks lock poisoned").iter() {
            hook(&current);
        }
        info!(batch = batch.len(), "change batch applied");
        Ok(true)
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Collect every alias in the payload tree; returns `true` if any entry
/// demands a full reload.
fn flatten_changes(changes: &[SchemaChange], aliases: &mut BTreeSet<String>) -> bool {
    let mut full = false;
    for change in changes {
        full |= change.kind == SchemaChangeKind::Full;
        aliases.insert(change.alias.clone());
        full |= flatten_changes(&change.descendants, aliases);
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_source::{InMemoryRowSource, NodeRow, RowSource};
    use canopy_tree::{NodeFragment, NodeId, TreeSchema, ROOT_ID};
    use std::sync::atomic::AtomicUsize;

    use crate::config::CacheConfig;

    fn row(id: NodeId, parent_id: NodeId, level: u32, sort_order: i32, path: &str, tag: &str) -> NodeRow {
        NodeRow::from_fragment(
            NodeFragment::new(id, parent_id, level, sort_order)
                .with_tag(tag)
                .with_path(path)
                .with_revision(1),
        )
    }

    fn seeded() -> (Arc<InMemoryRowSource>, Arc<ContentCache>) {
        let source = Arc::new(InMemoryRowSource::new());
        source.upsert(row(1, ROOT_ID, 1, 0, "-1,1", "section"));
        source.upsert(row(2, 1, 2, 0, "-1,1,2", "article"));
        source.upsert(row(3, 1, 2, 1, "-1,1,3", "article"));
        let config = CacheConfig {
            schema: TreeSchema::legacy(),
            ..Default::default()
        };
        let cache = Arc::new(
            ContentCache::new(config, Arc::clone(&source) as Arc<dyn RowSource>).unwrap(),
        );
        (source, cache)
    }

    #[test]
    fn batch_commits_once_and_reports_change() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));

        let changed = notifier.notify(&[ChangeDescriptor::remove(2)]).unwrap();
        assert!(changed);
        assert!(!cache.current().contains(2));
    }

    #[test]
    fn unchanged_batch_does_not_commit() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));
        let before = cache.current();

        let changed = notifier
            .notify(&[ChangeDescriptor::refresh_node(3)])
            .unwrap();

        assert!(!changed);
        // Same snapshot still published: no commit happened.
        assert!(Arc::ptr_eq(&before, &cache.current()));
    }

    #[test]
    fn hooks_fire_only_on_actual_change() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));

        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        notifier.register_resync_hook(Box::new(move |tree| {
            assert!(!tree.contains(2));
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        notifier
            .notify(&[ChangeDescriptor::refresh_node(3)])
            .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        notifier.notify(&[ChangeDescriptor::remove(2)]).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_batch_leaves_cache_consistent() {
        let (source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));
        let before = cache.current();

        // A branch stream that opens with the wrong id is fatal.
        source.upsert(row(9, 3, 3, 0, "-1,1,3,9", "article"));
        source.remove(3);
        source.set_item_state(3, canopy_source::ItemState::published_at("-1,1,3"));

        let result = notifier.notify(&[
            ChangeDescriptor::remove(2),
            ChangeDescriptor::refresh_node(3),
        ]);
        assert!(result.is_err());

        // The partial clone was discarded wholesale: node 2 is still here.
        assert!(Arc::ptr_eq(&before, &cache.current()));
        assert!(cache.current().contains(2));
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(cache);
        assert!(!notifier.notify(&[]).unwrap());
    }

    #[test]
    fn shutdown_refuses_further_batches() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(cache);
        notifier.shutdown();

        let result = notifier.notify(&[ChangeDescriptor::remove(2)]);
        assert!(matches!(result, Err(CacheError::Shutdown)));
    }

    // ----------------------------------------------------------
    // Schema changes
    // ----------------------------------------------------------

    #[test]
    fn full_schema_change_reloads_everything() {
        let (source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));

        source.remove(2);
        source.remove(3);
        let changed = notifier
            .notify_schema_change(&[SchemaChange::full("article")])
            .unwrap();

        assert!(changed);
        assert_eq!(cache.current().len(), 1);
    }

    #[test]
    fn targeted_schema_change_refreshes_matching_nodes() {
        let (source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));

        // Both articles pick up new content in the store.
        source.upsert(
            NodeRow::from_fragment(
                NodeFragment::new(2, 1, 2, 0)
                    .with_tag("article")
                    .with_path("-1,1,2")
                    .with_revision(2)
                    .with_data("title", "updated"),
            ),
        );

        let changed = notifier
            .notify_schema_change(&[SchemaChange::targeted("article", vec![])])
            .unwrap();

        assert!(changed);
        assert_eq!(cache.current().get(2).unwrap().revision, 2);
        // The untouched section node was not reloaded.
        assert_eq!(cache.current().get(1).unwrap().revision, 1);
    }

    #[test]
    fn descendant_schema_payloads_are_flattened() {
        let mut aliases = BTreeSet::new();
        let full = flatten_changes(
            &[SchemaChange::targeted(
                "section",
                vec![SchemaChange::targeted(
                    "article",
                    vec![SchemaChange::full("gallery")],
                )],
            )],
            &mut aliases,
        );

        assert!(full);
        assert_eq!(
            aliases.into_iter().collect::<Vec<_>>(),
            vec!["article", "gallery", "section"]
        );
    }

    #[test]
    fn schema_change_with_no_matching_nodes_is_a_noop() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(cache);
        let changed = notifier
            .notify_schema_change(&[SchemaChange::targeted("gallery", vec![])])
            .unwrap();
        assert!(!changed);
    }

    // ----------------------------------------------------------
    // Channel ingestion
    // ----------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscribed_channel_drives_the_patcher() {
        let (_source, cache) = seeded();
        let notifier = ChangeNotifier::new(Arc::clone(&cache));

        let sender = notifier.subscribe();
        sender.send(vec![ChangeDescriptor::remove(2)]).unwrap();

        // Wait for the drain task to apply the batch.
        for _ in 0..100 {
            if !cache.current().contains(2) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!cache.current().contains(2));
    }
}

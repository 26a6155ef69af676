//! The canopy cache engine.
//!
//! An in-process, crash-consistent cache of a hierarchical content tree,
//! mirrored from a relational row source and optionally from a disk
//! snapshot. Many readers run fully in parallel against captured
//! snapshots; rare writers clone the live tree, patch the clone, and
//! publish it with one atomic pointer swap.
//!
//! # Architecture
//!
//! - [`SnapshotLock`] -- one mutex serializing every writer sequence, with
//!   blocking and suspending acquisition over the same exclusion.
//! - [`SnapshotCell`] -- the live-tree pointer; readers load it lock-free.
//! - [`ReadHandle`] / [`WriteHandle`] -- scoped accessors: capture without
//!   cloning on the read side, clone-mutate-commit on the write side.
//! - [`IncrementalPatcher`] -- applies change batches to a clone: remove,
//!   branch reload, or in-place patch, per descriptor.
//! - [`ChangeNotifier`] -- routes external change batches into the patcher
//!   and fires dependent-cache resync only on actual change.
//!
//! # Consistency
//!
//! A batch is atomic: readers see the tree before it or after it, never a
//! partially patched state. A failed batch discards its clone -- the cache
//! stays at its last consistent state. Masked items (whose parent is not
//! in the tree) are skipped, not errors; they heal on the next full
//! reload.

pub mod cache;
pub mod cell;
pub mod config;
pub mod error;
pub mod handle;
pub mod lock;
pub mod notifier;
pub mod patcher;
pub mod routes;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::ContentCache;
pub use cell::SnapshotCell;
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use handle::{ReadHandle, WriteHandle};
pub use lock::{SnapshotGuard, SnapshotLock};
pub use notifier::{ChangeNotifier, ResyncHook, SchemaChange, SchemaChangeKind};
pub use patcher::{ChangeDescriptor, ChangeKind, IncrementalPatcher};
pub use routes::RouteCache;

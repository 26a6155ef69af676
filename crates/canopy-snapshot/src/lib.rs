//! On-disk snapshot persistence for the canopy content tree.
//!
//! One snapshot file mirrors the live tree so a restart can skip the full
//! database load. The format is canonical UTF-8 text with stable
//! indentation, written whole-file; partial or corrupt files are deleted
//! rather than repaired (fail-safe-by-absence), and the cache falls back
//! to the database load path.

pub mod error;
pub mod file;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{SnapshotError, SnapshotResult};
pub use file::{FileSynchronizer, DEFAULT_POLL_INTERVAL};

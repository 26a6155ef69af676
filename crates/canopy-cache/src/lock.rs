//! The writer-exclusion primitive.
//!
//! One mutex serializes every writer sequence (load, patch, commit,
//! snapshot write) against every other. Readers never touch it: the live
//! tree pointer is read through the lock-free [`SnapshotCell`].
//!
//! Both acquisition forms -- blocking for synchronous call sites,
//! suspending for asynchronous ones -- share the same underlying mutex, so
//! a blocking acquire and a suspending acquire can never hold the lock
//! simultaneously.
//!
//! [`SnapshotCell`]: crate::cell::SnapshotCell

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Asynchronous mutual exclusion guarding the live-tree swap.
#[derive(Clone, Default)]
pub struct SnapshotLock {
    inner: Arc<Mutex<()>>,
}

impl SnapshotLock {
    /// Create a new, unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking the current thread.
    ///
    /// For synchronous call sites only: calling this from within an async
    /// runtime panics (tokio refuses to block a runtime worker). Async
    /// call sites use [`acquire_async`](Self::acquire_async).
    pub fn acquire(&self) -> SnapshotGuard {
        SnapshotGuard {
            _permit: Arc::clone(&self.inner).blocking_lock_owned(),
        }
    }

    /// Acquire the lock, suspending until it is free.
    pub async fn acquire_async(&self) -> SnapshotGuard {
        SnapshotGuard {
            _permit: Arc::clone(&self.inner).lock_owned().await,
        }
    }
}

impl std::fmt::Debug for SnapshotLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLock").finish()
    }
}

/// Releaser for [`SnapshotLock`].
///
/// The lock is released exactly once, when the guard is dropped. An
/// explicit [`release`](Self::release) consumes the guard, so a double
/// release cannot be expressed.
pub struct SnapshotGuard {
    _permit: OwnedMutexGuard<()>,
}

impl SnapshotGuard {
    /// Release the lock now instead of at end of scope.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn blocking_acquire_is_exclusive() {
        let lock = SnapshotLock::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let guard = lock.acquire();
                        let seen = counter.fetch_add(1, Ordering::SeqCst);
                        // Nobody else may enter while we hold the guard.
                        thread::sleep(Duration::from_micros(10));
                        assert_eq!(counter.load(Ordering::SeqCst), seen + 1);
                        counter.fetch_sub(1, Ordering::SeqCst);
                        guard.release();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[tokio::test]
    async fn async_acquire_is_exclusive() {
        let lock = SnapshotLock::new();

        let guard = lock.acquire_async().await;
        // A second acquisition must not complete while the first is held.
        let second = tokio::time::timeout(Duration::from_millis(50), lock.acquire_async()).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), lock.acquire_async()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn blocking_and_async_share_one_exclusion() {
        let lock = SnapshotLock::new();

        let blocking_lock = lock.clone();
        let held = Arc::new(AtomicUsize::new(0));
        let held_in_thread = Arc::clone(&held);

        let thread = thread::spawn(move || {
            let _guard = blocking_lock.acquire();
            held_in_thread.store(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            held_in_thread.store(0, Ordering::SeqCst);
        });

        // Wait for the thread to take the lock.
        while held.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let _guard = lock.acquire_async().await;
        // The blocking holder must be gone by the time we get it.
        assert_eq!(held.load(Ordering::SeqCst), 0);

        thread.join().unwrap();
    }

    #[test]
    fn release_then_reacquire() {
        let lock = SnapshotLock::new();
        lock.acquire().release();
        let _again = lock.acquire();
    }
}

//! Per-file advisory locks
//!
//! Process-local only. Running several processes against one storage root
//! needs an external coordinator in front of the provider.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};

/// Held while a partition is written or a file is re-verified
pub type SharedGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Held while a file is prepared, merged, stored or aborted
pub type ExclusiveGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Reader/writer lock table keyed by file name
///
/// ## Concurrency:
/// - The table `Mutex` is only held to look up or insert an entry, never
///   while waiting on a file's lock
/// - Guards own an `Arc` of their entry, so pruning never drops a held lock
#[derive(Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the shared side for `name` (blocks while exclusive is held)
    pub fn shared(&self, name: &str) -> SharedGuard {
        self.entry(name).read_arc()
    }

    /// Acquire the exclusive side for `name` (blocks while any guard is held)
    pub fn exclusive(&self, name: &str) -> ExclusiveGuard {
        self.entry(name).write_arc()
    }

    /// Drop entries nobody holds or waits on; returns how many were removed
    pub fn prune_idle(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Number of tracked names
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, name: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(()))),
        )
    }
}

//! Per-path advisory locks, held only for the commit phase of an operation
//! touching that path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily-created per-path mutexes. A path with no concurrent writers never
/// allocates more than one `Arc<Mutex<()>>`, shared by every acquirer.
#[derive(Default)]
pub struct PathLockTable {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `path`, blocking until available. Released
    /// when the returned guard is dropped.
    pub async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        mutex.lock_owned().await
    }
}

//! Exclusive per-path locks

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Default)]
struct LockTable {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Serializes edits to the same path; different paths never wait on each other.
#[derive(Clone, Default)]
pub struct PathLocks {
    table: Arc<LockTable>,
}

/// Holds a path until dropped.
pub struct PathGuard {
    path: PathBuf,
    table: Arc<LockTable>,
}

impl PathGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for PathGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGuard").field("path", &self.path).finish()
    }
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `path` is free, then take it.
    pub fn acquire(&self, path: &Path) -> PathGuard {
        let mut held = self.table.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(path) {
            tracing::debug!("Waiting for lock on {}", path.display());
            held = self
                .table
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(path.to_path_buf());
        self.guard(path)
    }

    pub fn try_acquire(&self, path: &Path) -> Option<PathGuard> {
        let mut held = self.table.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(path.to_path_buf()) {
            return None;
        }
        Some(self.guard(path))
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.table
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    fn guard(&self, path: &Path) -> PathGuard {
        PathGuard {
            path: path.to_path_buf(),
            table: Arc::clone(&self.table),
        }
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        let mut held = self.table.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.path);
        self.table.released.notify_all();
    }
}

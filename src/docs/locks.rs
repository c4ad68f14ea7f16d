//! Per-document writer lock registry.
//!
//! One `RwLock` per canonical document directory, created lazily and kept
//! for the life of the process. Writers hold the write half across the
//! whole hash-check → chunk append → meta rename → compiled rewrite
//! sequence; readers take the read half. Cross-process locking is not
//! attempted; a single service instance is assumed.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide registry mapping document paths to their lock.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<PathBuf, Arc<RwLock<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Fetch (or lazily create) the lock for a document directory.
    pub fn for_path(&self, path: &Path) -> Arc<RwLock<()>> {
        if let Some(existing) = self.locks.get(path) {
            return existing.clone();
        }
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Number of distinct documents locked so far. Bounded by the number
    /// of distinct document paths; the registry never shrinks.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_path_same_lock() {
        let registry = LockRegistry::new();
        let a = registry.for_path(Path::new("/data/projects/p1/docs/design"));
        let b = registry.for_path(Path::new("/data/projects/p1/docs/design"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_paths_distinct_locks() {
        let registry = LockRegistry::new();
        let a = registry.for_path(Path::new("/data/projects/p1/docs/design"));
        let b = registry.for_path(Path::new("/data/projects/p2/docs/design"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_writer_excludes_writer() {
        let registry = LockRegistry::new();
        let lock = registry.for_path(Path::new("/doc"));

        let guard = lock.write().await;
        assert!(lock.try_write().is_err());
        drop(guard);
        assert!(lock.try_write().is_ok());
    }
}

//! In-process per-path locks.
//!
//! Entries are created on demand and dropped once nobody holds or waits on
//! them, so the table only grows with the number of paths in flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds one or more path locks until dropped.
pub struct PathGuard<'a> {
    table: &'a PathLocks,
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &str) -> PathGuard<'_> {
        self.lock_all(&[path]).await
    }

    /// Lock every path in `paths`. Locks are taken in sorted order so two
    /// callers locking overlapping sets cannot deadlock.
    pub async fn lock_all(&self, paths: &[&str]) -> PathGuard<'_> {
        let mut keys: Vec<&str> = paths.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let mut held = Vec::with_capacity(keys.len());
        for key in keys {
            let mutex = Arc::clone(&*self.locks.entry(key.to_string()).or_default());
            held.push((key.to_string(), mutex.lock_owned().await));
        }

        PathGuard { table: self, held }
    }

    /// Number of paths currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        while let Some((key, guard)) = self.held.pop() {
            drop(guard);
            // The table's own reference is the last one once nobody waits.
            self.table
                .locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

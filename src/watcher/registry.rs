//! Registration table mapping subscription keys to watched directories.
//!
//! Every mutation touches exactly one entry, so the table is safe to read
//! while the watcher drains events on another thread.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::event::WatchKey;

/// Live subscriptions: key -> absolute directory path.
///
/// An entry is removed only when re-arming its key reports the directory is
/// gone.
#[derive(Debug, Default)]
pub struct RegistrationTable {
    entries: DashMap<WatchKey, PathBuf>,
}

impl RegistrationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Re-inserting a known key overwrites its path.
    pub fn insert(&self, key: WatchKey, dir: PathBuf) {
        self.entries.insert(key, dir);
    }

    /// Resolve a key to its directory.
    pub fn get(&self, key: WatchKey) -> Option<PathBuf> {
        self.entries.get(&key).map(|entry| entry.value().clone())
    }

    /// Drop a subscription, returning the directory it watched.
    pub fn remove(&self, key: WatchKey) -> Option<PathBuf> {
        self.entries.remove(&key).map(|(_, dir)| dir)
    }

    /// Check if a directory is currently registered.
    pub fn contains_dir(&self, dir: &Path) -> bool {
        self.entries.iter().any(|entry| entry.value() == dir)
    }

    /// Snapshot of all registered directories, sorted.
    pub fn dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.entries.iter().map(|e| e.value().clone()).collect();
        dirs.sort();
        dirs
    }

    /// Get count of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every registration.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

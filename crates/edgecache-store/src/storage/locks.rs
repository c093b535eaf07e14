//! Concurrent access locking for storage operations.
//!
//! Readers and writers on different keys proceed in parallel; a writer on a
//! key excludes readers of that key, and subtree removal excludes everything.
//!
//! # Locking Strategy
//!
//! - **Tree lock**: one reader-writer lock per storage root. Every operation
//!   takes it shared except Delete, which takes it exclusive so a subtree is
//!   never removed underneath a walk or a write.
//! - **Entry locks**: one reader-writer lock per key, created lazily.
//!   Create/Update hold it exclusive, Get holds it shared. Each operation
//!   releases its key's lock when done, and Delete releases the locks of the
//!   removed subtree, so the table only holds keys in use.
//!
//! # Deadlock Prevention
//!
//! 1. Acquire the tree lock before any entry lock
//! 2. Hold at most one entry lock at a time
//! 3. Never upgrade read locks to write locks

use dashmap::DashMap;
use parking_lot::{
    ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use std::sync::Arc;

use super::key::StorageKey;

/// Shared guard on a single entry.
pub type EntryReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Exclusive guard on a single entry.
pub type EntryWriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Central manager for storage locks.
///
/// One manager guards one cache root. Engines over the same root in one
/// process can share a manager through an `Arc`.
///
/// # Example
///
/// ```
/// use edgecache_store::storage::{StorageKey, StorageLockManager};
///
/// let manager = StorageLockManager::new();
/// let key = StorageKey::parse("pods/default/nginx").unwrap();
///
/// let _tree = manager.tree_read();
/// let _entry = manager.entry_write(&key);
/// assert_eq!(manager.entry_lock_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct StorageLockManager {
    tree: RwLock<()>,

    /// Per-key locks for entry read/write operations.
    entry_locks: DashMap<StorageKey, Arc<RwLock<()>>>,
}

impl StorageLockManager {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(()),
            entry_locks: DashMap::new(),
        }
    }

    /// Shared access to the whole tree.
    pub fn tree_read(&self) -> RwLockReadGuard<'_, ()> {
        self.tree.read()
    }

    /// Exclusive access to the whole tree.
    pub fn tree_write(&self) -> RwLockWriteGuard<'_, ()> {
        self.tree.write()
    }

    /// Get or create the lock for an entry.
    pub fn entry_lock(&self, key: &StorageKey) -> Arc<RwLock<()>> {
        self.entry_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Acquire shared access to an entry.
    pub fn entry_read(&self, key: &StorageKey) -> EntryReadGuard {
        self.entry_lock(key).read_arc()
    }

    /// Acquire exclusive access to an entry.
    pub fn entry_write(&self, key: &StorageKey) -> EntryWriteGuard {
        self.entry_lock(key).write_arc()
    }

    /// Drop the lock for `key` once its guard is gone.
    ///
    /// Kept while any other caller still holds or waits on it. The check and
    /// removal run under the map's shard lock, so a concurrent
    /// [`entry_lock`](Self::entry_lock) either shares the old lock or inserts
    /// a fresh one.
    pub fn release_entry(&self, key: &StorageKey) {
        self.entry_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Drop unused locks for `prefix` and every key beneath it.
    pub fn release_subtree(&self, prefix: &StorageKey) {
        self.entry_locks
            .retain(|key, lock| !key.starts_with(prefix) || Arc::strong_count(lock) > 1);
    }

    /// Remove entry locks nobody holds.
    ///
    /// A lock whose `Arc` has a single strong reference is only referenced by
    /// the map itself.
    pub fn cleanup_unused_locks(&self) {
        self.entry_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of cached entry locks.
    pub fn entry_lock_count(&self) -> usize {
        self.entry_locks.len()
    }
}

//! File-backed key-value storage for cached cluster objects.
//!
//! [`DiskStorage`] persists the last known state of objects under a single
//! cache root so reads keep working while the upstream control plane is
//! unreachable. Every key maps to a path through the [`PathResolver`]; a regular
//! file at that path is an *entry*, a directory is a *namespace node* holding
//! entries beneath it.
//!
//! # Key Methods
//!
//! - **Writes**: [`create`](DiskStorage::create), [`update`](DiskStorage::update)
//! - **Reads**: [`get`](DiskStorage::get), [`list`](DiskStorage::list), [`list_keys`](DiskStorage::list_keys)
//! - **Removal**: [`delete`](DiskStorage::delete), single entries or whole namespaces
//!
//! A key that was never written is not an error: `get` returns empty data and
//! `list`/`list_keys`/`delete` succeed with nothing to do.
//!
//! # Concurrency
//!
//! Entries are written to a temp file next to their final location and renamed
//! into place, so a reader sees either the old or the new content. Structural
//! changes are coordinated by a [`StorageLockManager`]; see its module docs for
//! the lock ordering.
//!
//! # Observability
//!
//! Public operations are instrumented with `tracing` spans carrying the key and
//! payload size. Payload bytes are never logged.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};
use walkdir::WalkDir;

use super::config::StorageConfig;
use super::key::{KeyError, StorageKey, TEMP_FILE_PREFIX};
use super::locks::StorageLockManager;
use super::resolver::{EntryKind, PathResolver, is_absent_error, is_temp_file_name};

/// Context for storage operations, used in error messages.
#[derive(Debug, Clone, Default)]
pub struct StorageContext {
    /// The operation that failed
    pub operation: Option<&'static str>,
    /// The key being operated on
    pub key: Option<String>,
    /// The on-disk path involved
    pub path: Option<PathBuf>,
}

impl StorageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Wrap an I/O error with this context.
    pub(crate) fn io(&self) -> impl FnOnce(io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            source,
            context: self.clone(),
        }
    }
}

impl fmt::Display for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref key) = self.key {
            parts.push(format!("key '{key}'"));
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error for {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: StorageContext,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Expected entry but found namespace: '{key}'")]
    IsNamespace { key: String },

    #[error("Cannot store '{key}': ancestor '{ancestor}' is an entry")]
    AncestorIsEntry { key: String, ancestor: String },

    #[error("Unexpected file type at {path:?}")]
    UnexpectedFileType { path: PathBuf },

    #[error("Atomic write failed for {context}: {reason}")]
    AtomicWriteFailed {
        reason: String,
        context: StorageContext,
    },

    #[error("Listing of '{key}' was cancelled")]
    Cancelled { key: String },

    /// The blocking task running the operation panicked or was aborted (async only)
    #[cfg(feature = "async")]
    #[error("Storage task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<io::Error> for StorageError {
    fn from(source: io::Error) -> Self {
        StorageError::Io {
            source,
            context: StorageContext::new(),
        }
    }
}

impl StorageError {
    /// Whether this error reports a key that is a namespace node.
    pub fn is_namespace(&self) -> bool {
        matches!(self, StorageError::IsNamespace { .. })
    }
}

/// Hierarchical key-value store rooted at one directory.
///
/// # Example
///
/// ```
/// use edgecache_store::storage::DiskStorage;
///
/// let temp = tempfile::TempDir::new().unwrap();
/// let storage = DiskStorage::open(temp.path()).unwrap();
///
/// storage.create("pods/default/nginx", b"v1").unwrap();
/// assert_eq!(storage.get("pods/default/nginx").unwrap(), b"v1");
///
/// // Missing keys read as empty
/// assert!(storage.get("pods/default/missing").unwrap().is_empty());
///
/// // Namespaces list every entry beneath them
/// storage.create("pods/default/redis", b"v2").unwrap();
/// let mut keys = storage.list_keys("pods").unwrap();
/// keys.sort();
/// assert_eq!(keys, vec!["pods/default/nginx", "pods/default/redis"]);
///
/// storage.delete("pods").unwrap();
/// assert!(storage.list("pods").unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct DiskStorage {
    resolver: PathResolver,
    locks: Arc<StorageLockManager>,
    sync_writes: bool,
}

impl DiskStorage {
    /// Open storage at `root` with default settings.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::new(StorageConfig::new(root.as_ref()))
    }

    /// Create storage from a configuration, creating the root if absent.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        Self::with_lock_manager(config, Arc::new(StorageLockManager::new()))
    }

    /// Create storage sharing an existing lock manager.
    ///
    /// Use this when more than one engine in the process serves the same root.
    #[instrument(level = "info", skip(config, locks), fields(root = %config.root_dir.display()))]
    pub fn with_lock_manager(
        config: StorageConfig,
        locks: Arc<StorageLockManager>,
    ) -> Result<Self, StorageError> {
        let ctx = StorageContext::new()
            .with_operation("init")
            .with_path(&config.root_dir);
        fs::create_dir_all(&config.root_dir).map_err(ctx.io())?;

        let storage = Self {
            resolver: PathResolver::new(config.root_dir),
            locks,
            sync_writes: config.sync_writes,
        };

        if config.sweep_temp_files {
            let swept = storage.sweep_temp_files()?;
            if swept > 0 {
                warn!(swept, "Removed temp files left by interrupted writes");
            }
        }

        info!(sync_writes = storage.sync_writes, "Initialized disk storage");
        Ok(storage)
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn lock_manager(&self) -> &Arc<StorageLockManager> {
        &self.locks
    }

    /// Store `data` under `key`, replacing any previous value.
    ///
    /// Missing namespace directories are created. Fails if `key` is a
    /// namespace node or one of its prefixes is an entry.
    #[instrument(level = "debug", skip(self, data), fields(key = %key, size = data.len()))]
    pub fn create(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = StorageKey::parse(key)?;
        let _tree = self.locks.tree_read();
        let entry = self.locks.entry_write(&key);
        let result = self.write_entry(&key, data, "create");
        drop(entry);
        self.locks.release_entry(&key);
        result
    }

    /// Read the value stored under `key`.
    ///
    /// Returns empty data if nothing is cached there.
    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let key = StorageKey::parse(key)?;
        let _tree = self.locks.tree_read();
        let entry = self.locks.entry_read(&key);
        let result = self.read_value(&key);
        drop(entry);
        self.locks.release_entry(&key);
        result
    }

    /// Caller holds the tree lock and the entry lock shared.
    fn read_value(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let (path, kind) = self.resolver.lookup(key)?;
        match kind {
            EntryKind::Absent => {
                debug!("Key not cached");
                Ok(Vec::new())
            }
            EntryKind::Directory => Err(StorageError::IsNamespace {
                key: key.to_string(),
            }),
            EntryKind::File => {
                let data = read_entry(key, &path)?.unwrap_or_default();
                trace!(size = data.len(), "Read entry");
                Ok(data)
            }
        }
    }

    /// Overwrite the value under `key`.
    ///
    /// An empty `data` leaves the stored value untouched. Otherwise this
    /// behaves like [`create`](Self::create).
    #[instrument(level = "debug", skip(self, data), fields(key = %key, size = data.len()))]
    pub fn update(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = StorageKey::parse(key)?;
        if data.is_empty() {
            debug!("Empty payload, keeping stored value");
            return Ok(());
        }

        let _tree = self.locks.tree_read();
        let entry = self.locks.entry_write(&key);
        let result = self.write_entry(&key, data, "update");
        drop(entry);
        self.locks.release_entry(&key);
        result
    }

    /// Remove an entry, or a namespace node with everything beneath it.
    ///
    /// Deleting a missing key succeeds. Namespace directories left empty by
    /// the removal are pruned.
    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = StorageKey::parse(key)?;
        let _tree = self.locks.tree_write();

        let (path, kind) = self.resolver.lookup(&key)?;
        let ctx = StorageContext::new()
            .with_operation("delete")
            .with_key(key.as_str())
            .with_path(&path);

        // No other operation runs while the tree is held exclusive
        self.locks.release_subtree(&key);

        let removed = match kind {
            EntryKind::Absent => {
                debug!("Key not cached, nothing to delete");
                return Ok(());
            }
            EntryKind::File => fs::remove_file(&path),
            EntryKind::Directory => {
                info!(path = %path.display(), "Removing namespace subtree");
                fs::remove_dir_all(&path)
            }
        };
        match removed {
            Ok(()) => {}
            Err(e) if is_absent_error(&e) => {}
            Err(e) => return Err(ctx.io()(e)),
        }

        self.prune_empty_parents(&path);
        Ok(())
    }

    /// Values of every entry at or beneath `key`, in no particular order.
    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub fn list(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        self.list_inner(key, None)
    }

    /// Keys of every entry at or beneath `key`, in no particular order.
    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub fn list_keys(&self, key: &str) -> Result<Vec<String>, StorageError> {
        self.list_keys_inner(key, None)
    }

    /// Like [`list`](Self::list), stopping with [`StorageError::Cancelled`]
    /// once `cancel` is observed set between visited entries.
    #[instrument(level = "debug", skip(self, cancel), fields(key = %key))]
    pub fn list_cancellable(
        &self,
        key: &str,
        cancel: &AtomicBool,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        self.list_inner(key, Some(cancel))
    }

    /// Like [`list_keys`](Self::list_keys), stopping with
    /// [`StorageError::Cancelled`] once `cancel` is observed set.
    #[instrument(level = "debug", skip(self, cancel), fields(key = %key))]
    pub fn list_keys_cancellable(
        &self,
        key: &str,
        cancel: &AtomicBool,
    ) -> Result<Vec<String>, StorageError> {
        self.list_keys_inner(key, Some(cancel))
    }

    fn list_inner(
        &self,
        key: &str,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let key = StorageKey::parse(key)?;
        let _tree = self.locks.tree_read();

        let mut values = Vec::new();
        self.visit_entries(&key, cancel, |entry_key, path| {
            // Gone between readdir and read: skip it.
            if let Some(data) = read_entry(entry_key, path)? {
                values.push(data);
            }
            Ok(())
        })?;
        debug!(entry_count = values.len(), "Listed entries");
        Ok(values)
    }

    fn list_keys_inner(
        &self,
        key: &str,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<String>, StorageError> {
        let key = StorageKey::parse(key)?;
        let _tree = self.locks.tree_read();

        let mut keys = Vec::new();
        self.visit_entries(&key, cancel, |entry_key, _| {
            keys.push(entry_key.to_string());
            Ok(())
        })?;
        debug!(key_count = keys.len(), "Listed keys");
        Ok(keys)
    }

    /// Write an entry. Caller holds the tree lock shared and the entry lock
    /// exclusive.
    fn write_entry(
        &self,
        key: &StorageKey,
        data: &[u8],
        operation: &'static str,
    ) -> Result<(), StorageError> {
        let (path, kind) = self.resolver.lookup(key)?;
        let ctx = StorageContext::new()
            .with_operation(operation)
            .with_key(key.as_str())
            .with_path(&path);

        match kind {
            EntryKind::Directory => {
                return Err(StorageError::IsNamespace {
                    key: key.to_string(),
                });
            }
            EntryKind::Absent => {
                self.ensure_no_entry_ancestor(key)?;
                self.write_new_entry(&path, data, &ctx)?;
            }
            EntryKind::File => self.atomic_write(&path, data, &ctx)?,
        }

        trace!(path = %path.display(), "Entry written");
        Ok(())
    }

    /// Create missing namespaces and write the entry; on failure, remove the
    /// namespaces left empty so the prefix does not turn into a stray node.
    fn write_new_entry(
        &self,
        path: &Path,
        data: &[u8],
        ctx: &StorageContext,
    ) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ctx.io())?;
        }
        let written = self.atomic_write(path, data, ctx);
        if written.is_err() {
            self.prune_empty_parents(path);
        }
        written
    }

    fn ensure_no_entry_ancestor(&self, key: &StorageKey) -> Result<(), StorageError> {
        for ancestor in key.ancestors() {
            match self.resolver.lookup(&ancestor)?.1 {
                EntryKind::File => {
                    return Err(StorageError::AncestorIsEntry {
                        key: key.to_string(),
                        ancestor: ancestor.to_string(),
                    });
                }
                // Nothing deeper can exist either.
                EntryKind::Absent => break,
                EntryKind::Directory => {}
            }
        }
        Ok(())
    }

    /// Write data atomically using temp file + rename pattern
    fn atomic_write(
        &self,
        path: &Path,
        data: &[u8],
        ctx: &StorageContext,
    ) -> Result<(), StorageError> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::AtomicWriteFailed {
                reason: "No parent directory".to_string(),
                context: ctx.clone(),
            })?;

        // Same directory as the target so the rename stays on one filesystem
        let mut temp_file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(parent)
            .map_err(ctx.io())?;
        temp_file.write_all(data).map_err(ctx.io())?;
        if self.sync_writes {
            temp_file.as_file().sync_all().map_err(ctx.io())?;
        }
        temp_file
            .persist(path)
            .map_err(|e| StorageError::AtomicWriteFailed {
                reason: format!("Failed to persist temp file: {e}"),
                context: ctx.clone(),
            })?;
        Ok(())
    }

    /// Call `visit` for every entry at or beneath `key`.
    ///
    /// Caller holds the tree lock shared, so no subtree disappears mid-walk.
    /// Directories created concurrently may or may not be visited.
    fn visit_entries<F>(
        &self,
        key: &StorageKey,
        cancel: Option<&AtomicBool>,
        mut visit: F,
    ) -> Result<(), StorageError>
    where
        F: FnMut(&StorageKey, &Path) -> Result<(), StorageError>,
    {
        let (path, kind) = self.resolver.lookup(key)?;
        match kind {
            EntryKind::Absent => return Ok(()),
            EntryKind::File => return visit(key, &path),
            EntryKind::Directory => {}
        }

        // Follow links so the walk classifies paths the way lookups do
        for item in WalkDir::new(&path).min_depth(1).follow_links(true) {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                debug!("Walk cancelled");
                return Err(StorageError::Cancelled {
                    key: key.to_string(),
                });
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(e) if e.io_error().is_some_and(is_absent_error) => {
                    trace!(error = %e, "Entry vanished during walk");
                    continue;
                }
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!(error = %e, "Skipping symlink loop");
                    continue;
                }
                Err(e) => {
                    let ctx = StorageContext::new()
                        .with_operation("walk")
                        .with_key(key.as_str());
                    let ctx = match e.path() {
                        Some(p) => ctx.with_path(p),
                        None => ctx,
                    };
                    return Err(ctx.io()(io::Error::from(e)));
                }
            };

            if is_temp_file_name(entry.file_name()) {
                continue;
            }
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                warn!(path = %entry.path().display(), "Skipping non-regular file");
                continue;
            }

            let Some(entry_key) = self.resolver.key_for(entry.path()) else {
                warn!(path = %entry.path().display(), "Skipping file with unusable name");
                continue;
            };
            visit(&entry_key, entry.path())?;
        }
        Ok(())
    }

    /// Remove directories between `path` and the root that are now empty.
    fn prune_empty_parents(&self, path: &Path) {
        let root = self.resolver.root();
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            // Fails on the first non-empty directory
            if fs::remove_dir(dir).is_err() {
                break;
            }
            trace!(dir = %dir.display(), "Pruned empty namespace");
            current = dir.parent();
        }
    }

    /// Delete temp files left under the root by interrupted writes.
    fn sweep_temp_files(&self) -> Result<usize, StorageError> {
        let _tree = self.locks.tree_write();
        let mut swept = 0;

        for entry in WalkDir::new(self.resolver.root())
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() || !is_temp_file_name(entry.file_name()) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => swept += 1,
                Err(e) if is_absent_error(&e) => {}
                Err(e) => {
                    let ctx = StorageContext::new()
                        .with_operation("sweep")
                        .with_path(entry.path());
                    return Err(ctx.io()(e));
                }
            }
        }
        Ok(swept)
    }
}

/// Read an entry's content; `None` if it no longer exists.
fn read_entry(key: &StorageKey, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if is_absent_error(&e) => Ok(None),
        Err(e) => {
            let ctx = StorageContext::new()
                .with_operation("read")
                .with_key(key.as_str())
                .with_path(path);
            Err(ctx.io()(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, DiskStorage) {
        let temp = TempDir::new().unwrap();
        let storage = DiskStorage::open(temp.path().join("cache")).unwrap();
        (temp, storage)
    }

    #[test]
    fn test_open_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("a/b/cache");
        let storage = DiskStorage::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.root(), root);

        // Idempotent
        DiskStorage::open(&root).unwrap();
    }

    #[test]
    fn test_create_writes_regular_file() {
        let (_temp, storage) = storage();
        storage
            .create("kubelet/default/pods/test-pod", b"test-pod")
            .unwrap();

        let file = storage.root().join("kubelet/default/pods/test-pod");
        assert!(fs::metadata(&file).unwrap().is_file());
        assert_eq!(fs::read(&file).unwrap(), b"test-pod");
    }

    #[test]
    fn test_create_into_existing_directory() {
        let (_temp, storage) = storage();
        fs::create_dir_all(storage.root().join("kubelet/default/pods")).unwrap();

        storage
            .create("kubelet/default/pods/test-pod", b"test-pod")
            .unwrap();
        assert_eq!(
            storage.get("kubelet/default/pods/test-pod").unwrap(),
            b"test-pod"
        );
    }

    #[test]
    fn test_create_over_namespace_fails() {
        let (_temp, storage) = storage();
        storage.create("a/b/c", b"v").unwrap();

        let err = storage.create("a/b", b"v").unwrap_err();
        assert!(err.is_namespace(), "got {err:?}");
        // Subtree untouched
        assert_eq!(storage.get("a/b/c").unwrap(), b"v");
    }

    #[test]
    fn test_create_beneath_entry_fails() {
        let (_temp, storage) = storage();
        storage.create("a", b"v").unwrap();

        let err = storage.create("a/b/c", b"v").unwrap_err();
        match err {
            StorageError::AncestorIsEntry { key, ancestor } => {
                assert_eq!(key, "a/b/c");
                assert_eq!(ancestor, "a");
            }
            other => panic!("expected AncestorIsEntry, got {other:?}"),
        }
        assert_eq!(storage.get("a").unwrap(), b"v");
    }

    #[test]
    fn test_no_temp_files_left_after_writes() {
        let (_temp, storage) = storage();
        storage.create("ns/key", b"one").unwrap();
        storage.create("ns/key", b"two").unwrap();
        storage.update("ns/key", b"three").unwrap();

        let names: Vec<_> = fs::read_dir(storage.root().join("ns"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("key")]);
    }

    #[test]
    fn test_sync_writes() {
        let temp = TempDir::new().unwrap();
        let storage =
            DiskStorage::new(StorageConfig::new(temp.path()).with_sync_writes(true)).unwrap();
        storage.create("x", b"durable").unwrap();
        assert_eq!(storage.get("x").unwrap(), b"durable");
    }

    #[test]
    fn test_get_namespace_fails() {
        let (_temp, storage) = storage();
        storage.create("kubelet/default/pods/test-pod", b"x").unwrap();

        let err = storage.get("kubelet/default/pods").unwrap_err();
        assert!(err.is_namespace());
    }

    #[test]
    fn test_get_beneath_entry_is_empty() {
        let (_temp, storage) = storage();
        storage.create("a", b"v").unwrap();
        assert!(storage.get("a/b").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_rejected_everywhere() {
        let (_temp, storage) = storage();
        assert!(matches!(
            storage.create("", b"v"),
            Err(StorageError::InvalidKey(KeyError::Empty))
        ));
        assert!(matches!(storage.get(""), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.update("", b""), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.delete("/"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.list(".."), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.list_keys(""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_delete_prunes_empty_namespaces() {
        let (_temp, storage) = storage();
        storage.create("a/b/c", b"v").unwrap();
        storage.create("a/x", b"v").unwrap();

        storage.delete("a/b/c").unwrap();
        assert!(!storage.root().join("a/b").exists());
        // "a" still holds an entry
        assert!(storage.root().join("a").is_dir());

        storage.delete("a/x").unwrap();
        assert!(!storage.root().join("a").exists());
        assert!(storage.root().is_dir());

        // The freed prefix can now hold a value
        storage.create("a", b"leaf").unwrap();
        assert_eq!(storage.get("a").unwrap(), b"leaf");
    }

    #[test]
    fn test_failed_write_removes_new_namespaces() {
        let (_temp, storage) = storage();
        storage.create("kept/entry", b"v").unwrap();

        // Longer than any filesystem allows, so only the final rename fails
        let leaf = "n".repeat(300);
        let path = storage.root().join("fresh/ns").join(&leaf);
        let ctx = StorageContext::new().with_operation("create").with_path(&path);

        let err = storage.write_new_entry(&path, b"v", &ctx).unwrap_err();
        assert!(matches!(err, StorageError::AtomicWriteFailed { .. }));
        assert!(!storage.root().join("fresh").exists());
        assert!(storage.root().join("kept").is_dir());

        // The prefix is still free to hold a value
        storage.create("fresh", b"leaf").unwrap();
        assert_eq!(storage.get("fresh").unwrap(), b"leaf");
    }

    #[test]
    fn test_list_skips_temp_files() {
        let (_temp, storage) = storage();
        storage.create("ns/a", b"1").unwrap();
        fs::write(storage.root().join("ns/.edgecache-tmpdead"), b"partial").unwrap();

        assert_eq!(storage.list_keys("ns").unwrap(), vec!["ns/a".to_string()]);
        assert_eq!(storage.list("ns").unwrap(), vec![b"1".to_vec()]);
    }

    #[test]
    fn test_sweep_on_open() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        fs::create_dir_all(root.join("ns")).unwrap();
        fs::write(root.join("ns/.edgecache-tmpabc"), b"partial").unwrap();
        fs::write(root.join("ns/keep"), b"v").unwrap();

        let storage = DiskStorage::open(&root).unwrap();
        assert!(!root.join("ns/.edgecache-tmpabc").exists());
        assert_eq!(storage.get("ns/keep").unwrap(), b"v");
    }

    #[test]
    fn test_sweep_disabled() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".edgecache-tmpabc"), b"partial").unwrap();

        DiskStorage::new(StorageConfig::new(temp.path()).with_sweep_temp_files(false)).unwrap();
        assert!(temp.path().join(".edgecache-tmpabc").exists());
    }

    #[test]
    fn test_cancelled_walk() {
        let (_temp, storage) = storage();
        for i in 0..3 {
            storage.create(&format!("ns/key-{i}"), b"v").unwrap();
        }

        let cancel = AtomicBool::new(true);
        let err = storage.list_cancellable("ns", &cancel).unwrap_err();
        assert!(matches!(err, StorageError::Cancelled { ref key } if key == "ns"));
        let err = storage.list_keys_cancellable("ns", &cancel).unwrap_err();
        assert!(matches!(err, StorageError::Cancelled { .. }));

        let not_cancelled = AtomicBool::new(false);
        assert_eq!(storage.list_keys_cancellable("ns", &not_cancelled).unwrap().len(), 3);
    }

    #[test]
    fn test_error_display_includes_context() {
        let ctx = StorageContext::new()
            .with_operation("create")
            .with_key("pods/a")
            .with_path("/cache/pods/a");
        let err = StorageError::Io {
            source: io::Error::from(io::ErrorKind::PermissionDenied),
            context: ctx,
        };
        let msg = err.to_string();
        assert!(msg.contains("create"), "{msg}");
        assert!(msg.contains("key 'pods/a'"), "{msg}");
        assert!(msg.contains("/cache/pods/a"), "{msg}");

        assert_eq!(StorageContext::new().to_string(), "(no context)");
    }
}

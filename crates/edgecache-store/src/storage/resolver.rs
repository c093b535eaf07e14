//! Mapping between keys and paths under the cache root.
//!
//! [`PathResolver`] owns the root directory and is the only place that turns a
//! [`StorageKey`] into a filesystem path, or a discovered path back into a key.
//! [`PathResolver::classify`] produces the single [`EntryKind`] every engine
//! operation branches on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::disk::{StorageContext, StorageError};
use super::key::{StorageKey, TEMP_FILE_PREFIX};

/// What currently exists at a resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Nothing exists at the path.
    Absent,
    /// A regular file: the key denotes an entry.
    File,
    /// A directory: the key denotes a namespace node.
    Directory,
}

impl EntryKind {
    #[inline]
    pub fn is_absent(self) -> bool {
        self == EntryKind::Absent
    }

    #[inline]
    pub fn is_file(self) -> bool {
        self == EntryKind::File
    }

    #[inline]
    pub fn is_directory(self) -> bool {
        self == EntryKind::Directory
    }
}

/// Resolves keys against a fixed cache root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `key` beneath the root.
    pub fn resolve(&self, key: &StorageKey) -> PathBuf {
        key.as_relative_path().to_path(&self.root)
    }

    /// Probe `path` and report what it holds.
    ///
    /// Symlinks are followed. A path whose ancestor is a regular file cannot
    /// exist and is reported as [`EntryKind::Absent`].
    pub fn classify(&self, path: &Path) -> Result<EntryKind, StorageError> {
        let kind = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => EntryKind::File,
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            Ok(_) => {
                return Err(StorageError::UnexpectedFileType {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if is_absent_error(&e) => EntryKind::Absent,
            Err(source) => {
                return Err(StorageError::Io {
                    source,
                    context: StorageContext::new()
                        .with_operation("classify")
                        .with_path(path),
                });
            }
        };
        trace!(path = %path.display(), kind = ?kind, "Classified path");
        Ok(kind)
    }

    /// Resolve and classify in one step.
    pub fn lookup(&self, key: &StorageKey) -> Result<(PathBuf, EntryKind), StorageError> {
        let path = self.resolve(key);
        let kind = self.classify(&path)?;
        Ok((path, kind))
    }

    /// Map a path discovered under the root back to its key.
    ///
    /// Returns `None` for paths outside the root, the root itself, in-flight
    /// temp files and names that are not valid UTF-8.
    pub fn key_for(&self, path: &Path) -> Option<StorageKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            let segment = component.as_os_str().to_str()?;
            segments.push(segment);
        }
        StorageKey::parse(segments.join("/")).ok()
    }
}

/// Whether a filename belongs to an in-flight atomic write.
pub fn is_temp_file_name(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with(TEMP_FILE_PREFIX))
}

pub(crate) fn is_absent_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

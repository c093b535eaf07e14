//! Type-safe keys for the on-disk cache.
//!
//! A [`StorageKey`] is the validated, normalized form of a caller-supplied
//! key such as `"pods/kube-system/coredns"`. Segments are separated by `/`
//! regardless of the host OS and map one-to-one onto nested directory names
//! beneath the cache root.

use relative_path::{RelativePath, RelativePathBuf};
use std::fmt;
use thiserror::Error;

/// Filename prefix reserved for in-flight atomic writes.
///
/// Files carrying this prefix are never reported by listings, and keys may not
/// contain a segment that starts with it.
pub const TEMP_FILE_PREFIX: &str = ".edgecache-tmp";

/// Errors produced while validating a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Empty key provided")]
    Empty,

    #[error("Invalid segment '{segment}' in key '{key}'")]
    InvalidSegment { key: String, segment: String },

    #[error("Segment '{segment}' in key '{key}' uses the reserved temp-file prefix")]
    ReservedSegment { key: String, segment: String },
}

/// Normalized key addressing an entry or a namespace node.
///
/// # Examples
///
/// ```
/// use edgecache_store::storage::StorageKey;
///
/// let key = StorageKey::parse("/pods/default/nginx").unwrap();
/// assert_eq!(key.as_str(), "pods/default/nginx");
/// assert_eq!(key.file_name(), "nginx");
///
/// // Repeated separators collapse
/// assert_eq!(StorageKey::parse("pods//default/nginx").unwrap(), key);
///
/// // Empty keys are rejected
/// assert!(StorageKey::parse("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(RelativePathBuf);

impl StorageKey {
    /// Validate and normalize a raw key.
    ///
    /// Leading and trailing slashes are stripped and empty segments dropped.
    /// `.`/`..` segments, NUL bytes and the temp-file prefix are rejected.
    pub fn parse(key: impl AsRef<str>) -> Result<Self, KeyError> {
        let raw = key.as_ref();
        let mut normalized = RelativePathBuf::new();

        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains('\0') {
                return Err(KeyError::InvalidSegment {
                    key: raw.to_string(),
                    segment: segment.to_string(),
                });
            }
            if segment.starts_with(TEMP_FILE_PREFIX) {
                return Err(KeyError::ReservedSegment {
                    key: raw.to_string(),
                    segment: segment.to_string(),
                });
            }
            normalized.push(segment);
        }

        if normalized.as_str().is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(StorageKey(normalized))
    }

    /// Get the string representation of this key.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the underlying `RelativePath`.
    #[inline]
    pub fn as_relative_path(&self) -> &RelativePath {
        &self.0
    }

    /// Final segment of the key.
    pub fn file_name(&self) -> &str {
        // A parsed key always has at least one segment.
        self.0.file_name().unwrap_or_default()
    }

    /// Parent key, or `None` for a single-segment key.
    pub fn parent(&self) -> Option<StorageKey> {
        self.0
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(|p| StorageKey(p.to_relative_path_buf()))
    }

    /// Append a segment.
    ///
    /// The segment is validated with the same rules as [`StorageKey::parse`].
    pub fn join(&self, segment: impl AsRef<str>) -> Result<Self, KeyError> {
        StorageKey::parse(format!("{}/{}", self.as_str(), segment.as_ref()))
    }

    /// Iterate over the segments of this key.
    ///
    /// ```
    /// use edgecache_store::storage::StorageKey;
    ///
    /// let key = StorageKey::parse("pods/default/nginx").unwrap();
    /// let segments: Vec<_> = key.segments().collect();
    /// assert_eq!(segments, vec!["pods", "default", "nginx"]);
    /// ```
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }

    /// Proper prefixes of this key, shortest first.
    ///
    /// `a/b/c` yields `a` and `a/b`.
    pub fn ancestors(&self) -> Vec<StorageKey> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(key) = current {
            current = key.parent();
            out.push(key);
        }
        out.reverse();
        out
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &StorageKey) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<RelativePath> for StorageKey {
    fn as_ref(&self) -> &RelativePath {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for StorageKey {
    type Error = KeyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        StorageKey::parse(s)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        StorageKey::parse(s)
    }
}

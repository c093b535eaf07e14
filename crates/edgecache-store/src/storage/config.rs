//! Storage engine configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default cache root used by the edge proxy.
pub const DEFAULT_CACHE_ROOT: &str = "/etc/kubernetes/cache/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Storage root must not be empty")]
    EmptyRoot,
}

/// Settings for a [`DiskStorage`](super::DiskStorage) instance.
///
/// Deserialized from JSON; every field is optional:
///
/// ```
/// use edgecache_store::storage::StorageConfig;
///
/// let config = StorageConfig::from_json_str(r#"{ "root_dir": "/var/lib/edge/cache" }"#).unwrap();
/// assert_eq!(config.root_dir.to_str(), Some("/var/lib/edge/cache"));
/// assert!(!config.sync_writes);
/// assert!(config.sweep_temp_files);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under which the key space is rooted. Created if missing.
    pub root_dir: PathBuf,

    /// fsync each temp file before it is renamed into place.
    pub sync_writes: bool,

    /// Remove temp files left behind by interrupted writes at construction.
    pub sweep_temp_files: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_CACHE_ROOT),
            sync_writes: false,
            sweep_temp_files: true,
        }
    }
}

impl StorageConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn with_sweep_temp_files(mut self, sweep: bool) -> Self {
        self.sweep_temp_files = sweep;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: StorageConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.root_dir, PathBuf::from("/etc/kubernetes/cache/"));
        assert!(!config.sync_writes);
        assert!(config.sweep_temp_files);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = StorageConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn test_full_json() {
        let config = StorageConfig::from_json_str(
            r#"{ "root_dir": "/tmp/edge", "sync_writes": true, "sweep_temp_files": false }"#,
        )
        .unwrap();
        assert_eq!(
            config,
            StorageConfig::new("/tmp/edge")
                .with_sync_writes(true)
                .with_sweep_temp_files(false)
        );
    }

    #[test]
    fn test_empty_root_rejected() {
        let err = StorageConfig::from_json_str(r#"{ "root_dir": "" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRoot));
    }

    #[test]
    fn test_malformed_json() {
        let err = StorageConfig::from_json_str("{ root_dir").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("storage.json");
        fs::write(&path, r#"{ "sync_writes": true }"#).unwrap();

        let config = StorageConfig::from_file(&path).unwrap();
        assert!(config.sync_writes);
        assert_eq!(config.root_dir, PathBuf::from(DEFAULT_CACHE_ROOT));

        let missing = StorageConfig::from_file(&temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}

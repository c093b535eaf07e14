//! Hierarchical on-disk storage for cached cluster objects

pub mod config;
pub mod disk;
pub mod key;
pub mod locks;
pub mod resolver;
pub mod store;

#[cfg(feature = "async")]
pub mod async_disk;

#[cfg(feature = "async")]
pub use async_disk::DiskStorageAsync;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_CACHE_ROOT, StorageConfig};
pub use disk::{DiskStorage, StorageContext, StorageError};
pub use key::{KeyError, StorageKey, TEMP_FILE_PREFIX};
pub use locks::{EntryReadGuard, EntryWriteGuard, StorageLockManager};
pub use resolver::{EntryKind, PathResolver};
pub use store::Store;

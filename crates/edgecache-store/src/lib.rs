//! File-backed key-value store that keeps the last known state of cluster
//! objects on an edge node, so reads keep working while the control plane is
//! unreachable.

pub mod error;
pub mod storage;

// Re-export commonly used types at crate root
pub use storage::{DiskStorage, StorageConfig, StorageError, StorageKey, Store};

#[cfg(feature = "async")]
pub use storage::DiskStorageAsync;

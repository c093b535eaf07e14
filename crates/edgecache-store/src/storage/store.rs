//! The storage interface consumed by the caching proxy.

use super::disk::{DiskStorage, StorageError};

/// Key-value operations over cached objects.
///
/// Keys are `/`-delimited; by convention the proxy uses
/// `<resourceKind>/<namespace>/<name>`. "Not found" is never an error:
/// [`get`](Store::get) returns empty data, listings return nothing and
/// [`delete`](Store::delete) succeeds.
pub trait Store: Send + Sync {
    /// Store `data` under `key`, replacing any previous value.
    fn create(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Value under `key`, or empty data if nothing is cached.
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace the value under `key`; empty `data` is a no-op.
    fn update(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Remove an entry or a whole namespace.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Values of every entry at or beneath `key`.
    fn list(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Keys of every entry at or beneath `key`.
    fn list_keys(&self, key: &str) -> Result<Vec<String>, StorageError>;
}

impl Store for DiskStorage {
    fn create(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        DiskStorage::create(self, key, data)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        DiskStorage::get(self, key)
    }

    fn update(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        DiskStorage::update(self, key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        DiskStorage::delete(self, key)
    }

    fn list(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        DiskStorage::list(self, key)
    }

    fn list_keys(&self, key: &str) -> Result<Vec<String>, StorageError> {
        DiskStorage::list_keys(self, key)
    }
}

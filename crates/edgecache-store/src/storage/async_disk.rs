//! Asynchronous facade over [`DiskStorage`].
//!
//! The proxy runs on Tokio; filesystem calls block, so each operation is moved
//! onto the blocking thread pool. Locking and atomicity are those of the
//! wrapped [`DiskStorage`].
//!
//! # Concurrency
//!
//! `DiskStorageAsync` is cheap to clone and can be moved into spawned tasks:
//!
//! ```ignore
//! let storage = storage.clone();
//! tokio::spawn(async move { storage.create("pods/default/nginx", data).await });
//! ```

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::instrument;

use super::config::StorageConfig;
use super::disk::{DiskStorage, StorageError};

#[derive(Debug, Clone)]
pub struct DiskStorageAsync {
    inner: Arc<DiskStorage>,
}

impl DiskStorageAsync {
    /// Open storage from a configuration on the blocking pool.
    pub async fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let storage = tokio::task::spawn_blocking(move || DiskStorage::new(config)).await??;
        Ok(Self::from_storage(Arc::new(storage)))
    }

    pub fn from_storage(inner: Arc<DiskStorage>) -> Self {
        Self { inner }
    }

    /// The wrapped synchronous engine.
    pub fn storage(&self) -> &Arc<DiskStorage> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&DiskStorage) -> Result<T, StorageError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner)).await?
    }

    #[instrument(level = "debug", skip(self, data), fields(key = %key, size = data.len()))]
    pub async fn create(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.create(&key, &data)).await
    }

    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.get(&key)).await
    }

    #[instrument(level = "debug", skip(self, data), fields(key = %key, size = data.len()))]
    pub async fn update(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.update(&key, &data)).await
    }

    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.delete(&key)).await
    }

    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub async fn list(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.list(&key)).await
    }

    #[instrument(level = "debug", skip(self), fields(key = %key))]
    pub async fn list_keys(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.list_keys(&key)).await
    }

    /// Cancellable [`list`](Self::list). Setting `cancel` stops the walk at the
    /// next visited entry; dropping the future does not.
    #[instrument(level = "debug", skip(self, cancel), fields(key = %key))]
    pub async fn list_cancellable(
        &self,
        key: &str,
        cancel: Arc<AtomicBool>,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.list_cancellable(&key, &cancel)).await
    }

    /// Cancellable [`list_keys`](Self::list_keys).
    #[instrument(level = "debug", skip(self, cancel), fields(key = %key))]
    pub async fn list_keys_cancellable(
        &self,
        key: &str,
        cancel: Arc<AtomicBool>,
    ) -> Result<Vec<String>, StorageError> {
        let key = key.to_owned();
        self.run(move |s| s.list_keys_cancellable(&key, &cancel)).await
    }
}

impl From<DiskStorage> for DiskStorageAsync {
    fn from(storage: DiskStorage) -> Self {
        Self::from_storage(Arc::new(storage))
    }
}

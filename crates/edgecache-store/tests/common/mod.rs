#![allow(dead_code)] // Not every test binary uses every helper

use edgecache_store::DiskStorage;
use std::collections::BTreeSet;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Namespace and entry keys shaped like the proxy's `<kind>/<namespace>/<name>`
pub const TEST_DIR: &str = "kubelet/default/pods";
pub const TEST_KEY: &str = "kubelet/default/pods/test-pod";

/// Route engine logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Storage rooted in a fresh temp directory.
///
/// Keep the `TempDir` alive for as long as the storage is used.
pub fn create_test_storage() -> (TempDir, DiskStorage) {
    init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = DiskStorage::open(temp_dir.path().join("cache")).expect("Failed to open storage");
    (temp_dir, storage)
}

/// Collect results into a set for order-insensitive comparison.
pub fn as_set<T: Ord, I: IntoIterator<Item = T>>(items: I) -> BTreeSet<T> {
    items.into_iter().collect()
}

/// Object snapshot of exactly `size` bytes.
pub fn create_sized_content(size: usize) -> Vec<u8> {
    let pattern = b"0123456789ABCDEF";
    (0..size).map(|i| pattern[i % pattern.len()]).collect()
}

//! Error types for the storage crate
//!
//! Re-exports every error type and its context structure so callers can match
//! on them from one place.

pub use crate::storage::config::ConfigError;
pub use crate::storage::disk::{StorageContext, StorageError};
pub use crate::storage::key::KeyError;

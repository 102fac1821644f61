//! Abstract storage traits for idmtools.
//!
//! A [`PersistStore`] is a namespaced key-value store of opaque records.
//! Typed access lives one level up, in `PersistService`. By keeping the
//! backend byte-oriented we get:
//! - An in-memory backend for tests and embedded use
//! - A file-backed backend behind the `persistent` feature

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A stored record failed its integrity check.
    #[error("Corrupt record '{key}': {message}")]
    Corrupt {
        key: String,
        message: String,
    },

    /// A record exceeded the configured size limit.
    #[error("Record '{key}' is {size} bytes, above the limit of {limit}")]
    RecordTooLarge {
        key: String,
        size: u64,
        limit: u64,
    },

    /// Another process holds the store.
    #[error("Store is locked: {0}")]
    Locked(String),

    /// Rejected configuration.
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
}

/// Storage trait for persisted records.
///
/// Keys are unique within a namespace. `get` of an unknown key is
/// `Ok(None)`, never an error.
///
/// # Safety Considerations
/// - Each `put` replaces the whole record
/// - Implementations must be safe to share between threads
pub trait PersistStore: Send + Sync {
    /// Insert or replace a record.
    fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Get a record by key.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a record. Returns whether it existed.
    fn remove(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;

    /// Remove every record of a namespace.
    fn clear(&self, namespace: &str) -> Result<(), StorageError>;

    /// Number of records in a namespace.
    fn len(&self, namespace: &str) -> Result<usize, StorageError>;

    /// Keys of a namespace in ascending order.
    fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

    /// Returns true if the namespace holds no records.
    fn is_empty(&self, namespace: &str) -> Result<bool, StorageError> {
        Ok(self.len(namespace)? == 0)
    }
}

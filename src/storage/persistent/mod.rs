//! Durable storage backend.
//!
//! - One record file per key, replaced atomically
//! - CRC32 checksums for corruption detection
//! - A holder-aware lock file for single-process access

mod codec;
mod file_lock;
mod store;

pub use file_lock::{FileLock, LockError, LockHolder};
pub use store::FileStore;

use std::path::Path;
use std::sync::Arc;

use super::{PersistenceContext, StorageError};

/// Configuration for [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreConfig {
    /// Whether to fsync each record before it replaces the old one.
    pub sync_on_write: bool,
    /// Largest accepted record payload (bytes).
    pub max_record_size: u64,
    /// Lock file at the store root. Must start with `.` so it can never
    /// collide with a namespace directory.
    pub lock_file_name: String,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_record_size: 100 * 1024 * 1024, // 100 MB
            lock_file_name: ".lock".to_string(),
        }
    }
}

impl FileStoreConfig {
    const MIN_RECORD_SIZE: u64 = 1024;

    /// # Errors
    /// Returns [`StorageError::InvalidConfig`] if `max_record_size` is below
    /// 1 KiB or above the 32-bit frame limit, or if `lock_file_name` is not a
    /// plain hidden file name.
    pub fn validate(self) -> Result<Self, StorageError> {
        if self.max_record_size < Self::MIN_RECORD_SIZE {
            return Err(StorageError::InvalidConfig(format!(
                "max_record_size must be at least {} bytes (got {})",
                Self::MIN_RECORD_SIZE,
                self.max_record_size
            )));
        }
        if self.max_record_size > u64::from(u32::MAX) {
            return Err(StorageError::InvalidConfig(format!(
                "max_record_size must be at most {} bytes (got {})",
                u32::MAX,
                self.max_record_size
            )));
        }
        let name = self.lock_file_name.as_str();
        if !name.starts_with('.') || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(StorageError::InvalidConfig(format!(
                "lock_file_name must be a hidden file name like '.lock' (got '{name}')"
            )));
        }
        Ok(self)
    }
}

/// Opens a persistence context backed by a [`FileStore`] at `path`.
///
/// # Errors
/// - If the configuration is invalid
/// - If the path cannot be created or accessed
/// - If another process holds the lock
///
/// # Example
/// ```rust,ignore
/// use idmtools::storage::persistent::open_context;
///
/// let ctx = open_context("./.idmtools", None)?;
/// let id = ctx.experiments().save(&experiment)?;
/// ```
pub fn open_context(
    path: impl AsRef<Path>,
    config: Option<FileStoreConfig>,
) -> Result<PersistenceContext, StorageError> {
    let store = FileStore::open(path, config.unwrap_or_default())?;
    Ok(PersistenceContext::new(Arc::new(store)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FileStoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tiny_record_size_rejected() {
        let config = FileStoreConfig {
            max_record_size: 10,
            ..FileStoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(StorageError::InvalidConfig(_))));
    }

    #[test]
    fn test_lock_file_name_must_be_hidden_file() {
        for name in ["lock", "experiments", ".", "..", "./x", ".locks/a", ""] {
            let config = FileStoreConfig {
                lock_file_name: name.to_string(),
                ..FileStoreConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(StorageError::InvalidConfig(_))),
                "{name:?} accepted"
            );
        }
        let config = FileStoreConfig {
            lock_file_name: ".idmtools.lock".to_string(),
            ..FileStoreConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}

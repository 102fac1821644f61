//! File-backed [`PersistStore`].
//!
//! Layout under the store root:
//! ```text
//! <root>/<lock file>          (`.lock` by default)
//! <root>/<namespace>/<key>.rec
//! ```
//! Each record file is replaced atomically (write temp, fsync, rename).

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use super::codec;
use super::{FileLock, FileStoreConfig, LockError};
use crate::storage::{PersistStore, StorageError};

const RECORD_EXTENSION: &str = "rec";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn validate_name(kind: &str, name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::BackendError(format!("invalid {kind} name '{name}'")))
    }
}

/// Durable store keeping one checksummed file per record.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    config: FileStoreConfig,
    writes: Mutex<()>,
    _lock: FileLock,
}

impl FileStore {
    /// Opens or creates a store at `root`, taking its directory lock.
    ///
    /// # Errors
    /// - [`StorageError::InvalidConfig`] if `config` is rejected
    /// - [`StorageError::Locked`] if another process holds the store
    /// - [`StorageError::BackendError`] if the directory cannot be created
    pub fn open(root: impl AsRef<Path>, config: FileStoreConfig) -> Result<Self, StorageError> {
        let config = config.validate()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::BackendError(format!(
                "failed to create store directory {}: {e}",
                root.display()
            ))
        })?;

        let lock = FileLock::acquire(&root, &config.lock_file_name).map_err(|e| match e {
            LockError::Held { .. } => StorageError::Locked(e.to_string()),
            LockError::Io { .. } => {
                StorageError::BackendError(format!("failed to lock {}: {e}", root.display()))
            }
        })?;

        log::info!("opened file store at {}", root.display());
        Ok(Self {
            root,
            config,
            writes: Mutex::new(()),
            _lock: lock,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn config(&self) -> &FileStoreConfig {
        &self.config
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, StorageError> {
        validate_name("namespace", namespace)?;
        Ok(self.root.join(namespace))
    }

    fn record_path(&self, namespace: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_name("key", key)?;
        Ok(self
            .namespace_dir(namespace)?
            .join(format!("{key}.{RECORD_EXTENSION}")))
    }

    fn write_record(&self, temp_path: &Path, value: &[u8]) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;
        writer.write_all(&codec::encode(value)?)?;
        writer.flush()?;
        if self.config.sync_on_write {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl PersistStore for FileStore {
    fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let size = value.len() as u64;
        if size > self.config.max_record_size {
            return Err(StorageError::RecordTooLarge {
                key: key.to_string(),
                size,
                limit: self.config.max_record_size,
            });
        }

        let path = self.record_path(namespace, key)?;
        let dir = self.namespace_dir(namespace)?;
        let _guard = self.writes.lock().map_err(|_| lock_err("file store write"))?;

        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::BackendError(format!("failed to create {}: {e}", dir.display()))
        })?;
        let temp_path = dir.join(format!("{key}.{RECORD_EXTENSION}.tmp.{}", Uuid::new_v4()));

        let written = self
            .write_record(&temp_path, &value)
            .and_then(|()| fs::rename(&temp_path, &path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != ErrorKind::NotFound {
                    log::warn!("failed to remove {}: {cleanup}", temp_path.display());
                }
            }
            return Err(StorageError::BackendError(format!(
                "failed to write {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.record_path(namespace, key)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::BackendError(format!(
                    "failed to open {}: {e}",
                    path.display()
                )))
            }
        };

        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)
            .and_then(|_| codec::decode(&mut reader, self.config.max_record_size))
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.record_path(namespace, key)?;
        let _guard = self.writes.lock().map_err(|_| lock_err("file store write"))?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::BackendError(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }

    fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        let dir = self.namespace_dir(namespace)?;
        let _guard = self.writes.lock().map_err(|_| lock_err("file store write"))?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::BackendError(format!(
                "failed to clear {}: {e}",
                dir.display()
            ))),
        }
    }

    fn len(&self, namespace: &str) -> Result<usize, StorageError> {
        Ok(self.keys(namespace)?.len())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.namespace_dir(namespace)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::BackendError(format!(
                    "failed to list {}: {e}",
                    dir.display()
                )))
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StorageError::BackendError(format!("failed to list {}: {e}", dir.display())))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn open(dir: &Path) -> FileStore {
        FileStore::open(dir, FileStoreConfig::default()).unwrap()
    }

    #[test]
    fn test_put_get_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path());
            store.put("experiments", "abc", b"payload".to_vec()).unwrap();
        }
        let store = open(dir.path());
        assert_eq!(store.get("experiments", "abc").unwrap().unwrap(), b"payload");
        assert!(store.get("experiments", "missing").unwrap().is_none());
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = open(dir.path());
        let err = FileStore::open(dir.path(), FileStoreConfig::default()).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.put("ns", "k", b"hello world".to_vec()).unwrap();

        let path = dir.path().join("ns").join("k.rec");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let err = store.get("ns", "k").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_keys_remove_clear() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.put("ns", "b", Vec::new()).unwrap();
        store.put("ns", "a", Vec::new()).unwrap();
        assert_eq!(store.keys("ns").unwrap(), vec!["a", "b"]);

        assert!(store.remove("ns", "a").unwrap());
        assert!(!store.remove("ns", "a").unwrap());
        assert_eq!(store.len("ns").unwrap(), 1);

        store.clear("ns").unwrap();
        assert_eq!(store.len("ns").unwrap(), 0);
        store.clear("ns").unwrap();
    }

    #[test]
    fn test_record_size_limit() {
        let dir = tempdir().unwrap();
        let config = FileStoreConfig {
            max_record_size: 1024,
            ..FileStoreConfig::default()
        };
        let store = FileStore::open(dir.path(), config).unwrap();
        let err = store.put("ns", "big", vec![0; 2048]).unwrap_err();
        assert!(matches!(err, StorageError::RecordTooLarge { size: 2048, .. }));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        assert!(store.put("../escape", "k", Vec::new()).is_err());
        assert!(store.put("ns", "a/b", Vec::new()).is_err());
        assert!(store.get("ns", ".lock").is_err());
    }
}

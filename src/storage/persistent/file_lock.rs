//! Exclusive, holder-aware lock on a store directory.
//!
//! The lock file sits at the store root under the name configured in
//! [`FileStoreConfig::lock_file_name`](super::FileStoreConfig). While held it
//! contains a small JSON [`LockHolder`] record so a refused opener can say
//! who has the store. The record is cleared when the [`FileLock`] drops.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Error as IoError, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who holds a store lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    /// Reads the holder record. `None` when the file is empty, unreadable or
    /// not a holder record; the OS lock stays authoritative.
    fn read(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(text.trim()).ok()
    }
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} since {}", self.pid, self.acquired_at.to_rfc3339())
    }
}

/// Failure to take a store lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is held by {}", .path.display(), holder_label(.holder))]
    Held {
        path: PathBuf,
        holder: Option<LockHolder>,
    },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: IoError,
    },
}

fn holder_label(holder: &Option<LockHolder>) -> String {
    holder
        .as_ref()
        .map_or_else(|| "another process".to_string(), ToString::to_string)
}

enum Attempt {
    Acquired,
    Contended,
}

/// Held exclusive lock on a store directory.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    holder: LockHolder,
}

impl FileLock {
    /// Locks `dir` through `dir/<file_name>` without blocking and records
    /// this process as the holder.
    ///
    /// # Errors
    /// - [`LockError::Held`] with the recorded holder when the lock is taken
    /// - [`LockError::Io`] if the lock file cannot be opened or written, or
    ///   the target has no file locking
    pub fn acquire(dir: &Path, file_name: &str) -> Result<Self, LockError> {
        let path = dir.join(file_name);
        let io_err = |source: IoError| LockError::Io {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        match Self::try_lock(&file).map_err(io_err)? {
            Attempt::Acquired => {}
            Attempt::Contended => {
                let holder = LockHolder::read(&path);
                log::debug!("store lock {} is contended", path.display());
                return Err(LockError::Held {
                    path: path.clone(),
                    holder,
                });
            }
        }

        let holder = LockHolder::current();
        let record = serde_json::to_vec(&holder).map_err(|e| io_err(IoError::other(e)))?;
        file.set_len(0).map_err(io_err)?;
        file.write_all(&record).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        log::debug!("acquired store lock {} as {holder}", path.display());

        Ok(Self { file, path, holder })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn holder(&self) -> &LockHolder {
        &self.holder
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> Result<Attempt, IoError> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `file` for the whole call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(Attempt::Acquired);
        }
        let err = IoError::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Ok(Attempt::Contended)
        } else {
            Err(err)
        }
    }

    #[cfg(windows)]
    fn try_lock(file: &File) -> Result<Attempt, IoError> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
        use windows_sys::Win32::Storage::FileSystem::{
            LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
        };
        use windows_sys::Win32::System::IO::OVERLAPPED;

        let handle = file.as_raw_handle() as HANDLE;
        // Lock a byte range far past the holder record so other processes can
        // still read it.
        // SAFETY: `handle` is owned by `file`; OVERLAPPED is plain data and
        // valid when zeroed apart from the offset set below.
        let result = unsafe {
            let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
            overlapped.Anonymous.Anonymous.OffsetHigh = 1;
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if result != 0 {
            return Ok(Attempt::Acquired);
        }
        let err = IoError::last_os_error();
        if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
            Ok(Attempt::Contended)
        } else {
            Err(err)
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn try_lock(_file: &File) -> Result<Attempt, IoError> {
        Err(IoError::new(
            std::io::ErrorKind::Unsupported,
            "file locking is not supported on this platform",
        ))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The OS releases the lock when `file` closes; clear the record first
        // so a later reader never sees a stale holder.
        if let Err(e) = self.file.set_len(0) {
            log::warn!("failed to clear store lock record {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_holder_recorded_in_lock_file() {
        let dir = tempdir().unwrap();
        let lock = FileLock::acquire(dir.path(), ".lock").unwrap();
        assert!(lock.path().ends_with(".lock"));
        assert_eq!(lock.holder().pid, std::process::id());
        assert_eq!(LockHolder::read(lock.path()).as_ref(), Some(lock.holder()));
    }

    #[test]
    fn test_contended_lock_names_holder() {
        let dir = tempdir().unwrap();
        let first = FileLock::acquire(dir.path(), ".store-lock").unwrap();

        let err = FileLock::acquire(dir.path(), ".store-lock").unwrap_err();
        match &err {
            LockError::Held { holder, .. } => assert_eq!(holder.as_ref(), Some(first.holder())),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(&format!("pid {}", std::process::id())));

        drop(first);
        assert!(LockHolder::read(&dir.path().join(".store-lock")).is_none());
        assert!(FileLock::acquire(dir.path(), ".store-lock").is_ok());
    }

    #[test]
    fn test_unreadable_record_falls_back_to_anonymous_holder() {
        let label = holder_label(&None);
        assert_eq!(label, "another process");
    }
}

//! Advisory file locks.
//!
//! A lock is an exclusively locked handle on a lock file. The host lock
//! (`flock` / `LockFileEx`) guards against other processes; a process-wide
//! table of held paths makes re-entrant attempts from this process fail
//! the same way, whatever the host's per-process lock semantics are.

use crate::error::{classify, EnvError, EnvResult};
use crate::file::FileLock;
use fs2::FileExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;

static LOCKED_FILES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Message reported when a lock is already held.
pub const LOCK_HELD_MESSAGE: &str = "could not lock file";

/// An exclusive lock on a host file.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct HostFileLock {
    filename: String,
    file: File,
}

impl HostFileLock {
    /// Acquires an exclusive lock on `path`, creating the file if absent.
    ///
    /// Fails immediately instead of waiting if the lock is held, including
    /// by this process.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` with message `could not lock file` if the lock
    /// is held, or a classified error if the file cannot be opened.
    pub fn acquire(path: &Path) -> EnvResult<Self> {
        let filename = path.to_string_lossy().into_owned();

        if !LOCKED_FILES.lock().insert(filename.clone()) {
            tracing::debug!(path = %filename, "lock already held by this process");
            return Err(EnvError::io(filename, LOCK_HELD_MESSAGE));
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
        {
            Ok(file) => file,
            Err(e) => {
                LOCKED_FILES.lock().remove(&filename);
                return Err(classify(filename, e));
            }
        };

        if file.try_lock_exclusive().is_err() {
            LOCKED_FILES.lock().remove(&filename);
            tracing::debug!(path = %filename, "lock held by another process");
            return Err(EnvError::io(filename, LOCK_HELD_MESSAGE));
        }

        tracing::debug!(path = %filename, "acquired file lock");
        Ok(Self { filename, file })
    }
}

impl FileLock for HostFileLock {
    fn path(&self) -> &str {
        &self.filename
    }
}

impl Drop for HostFileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.filename, error = %e, "failed to unlock file");
        }
        LOCKED_FILES.lock().remove(&self.filename);
        tracing::debug!(path = %self.filename, "released file lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn acquire_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let lock = HostFileLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path.to_string_lossy());
    }

    #[test]
    fn lock_is_not_reentrant() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let _held = HostFileLock::acquire(&path).unwrap();
        let err = HostFileLock::acquire(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(err.to_string().contains(LOCK_HELD_MESSAGE));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        {
            let _lock = HostFileLock::acquire(&path).unwrap();
        }

        let _again = HostFileLock::acquire(&path).unwrap();
    }

    #[test]
    fn host_lock_blocks_other_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let _lock = HostFileLock::acquire(&path).unwrap();
        let other = File::open(&path).unwrap();
        assert!(other.try_lock_exclusive().is_err());
    }

    #[test]
    fn failed_open_does_not_poison_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("LOCK");

        let err = HostFileLock::acquire(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        std::fs::create_dir(dir.path().join("missing")).unwrap();
        let _lock = HostFileLock::acquire(&path).unwrap();
    }
}

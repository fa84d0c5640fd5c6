//! Advisory repository lock.
//!
//! Write-capable commands take the lock exclusively, read-only commands
//! take it shared. The lock lives at `db/.lock` and is held for the full
//! duration of the command; acquisition fails fast with [`RepoError::Busy`]
//! after a short bounded wait.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use fs2::FileExt;
use tracing::debug;

use crate::error::{RepoError, RepoResult};

/// How many times acquisition is retried before giving up.
const RETRIES: u32 = 5;

/// Pause between acquisition attempts.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Whether to acquire a shared (read) or exclusive (write) lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared lock for read-only commands.
    Shared,
    /// Exclusive lock for write-capable commands.
    Exclusive,
}

/// A held repository lock. Released on drop.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
}

impl RepoLock {
    /// Acquire the lock at `lock_path` in the given mode.
    ///
    /// The lock file is created if missing. Acquisition is retried a small
    /// bounded number of times before failing.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Busy`] if the lock is held elsewhere after all
    /// retries, or [`RepoError::Io`] if the lock file cannot be opened.
    pub fn acquire(lock_path: &Path, mode: LockMode) -> RepoResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|e| RepoError::io(lock_path, e))?;

        for attempt in 0..RETRIES {
            let result = match mode {
                LockMode::Shared => <File as FileExt>::try_lock_shared(&file),
                LockMode::Exclusive => <File as FileExt>::try_lock_exclusive(&file),
            };
            match result {
                Ok(()) => {
                    debug!(path = %lock_path.display(), ?mode, "acquired repository lock");
                    return Ok(Self { file });
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if attempt + 1 < RETRIES {
                        std::thread::sleep(RETRY_DELAY);
                    }
                },
                Err(e) => return Err(RepoError::io(lock_path, e)),
            }
        }

        Err(RepoError::Busy {
            path: lock_path.to_path_buf(),
        })
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // fs2::FileExt::unlock requires the trait in scope.
        let _ = <File as FileExt>::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_excludes_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let _held = RepoLock::acquire(&path, LockMode::Exclusive).unwrap();
        let result = RepoLock::acquire(&path, LockMode::Exclusive);
        assert!(matches!(result, Err(RepoError::Busy { .. })));
    }

    #[test]
    fn shared_allows_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let _a = RepoLock::acquire(&path, LockMode::Shared).unwrap();
        let _b = RepoLock::acquire(&path, LockMode::Shared).unwrap();
    }

    #[test]
    fn released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        drop(RepoLock::acquire(&path, LockMode::Exclusive).unwrap());
        let _again = RepoLock::acquire(&path, LockMode::Exclusive).unwrap();
    }
}

//! The snapshot build lock.
//!
//! A file-system lock enforces at-most-one builder system-wide. The file
//! records `pid|unix-ts`. A lock older than the stale threshold is
//! presumed abandoned by a crashed builder and reclaimed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::error::SnapshotError;

/// Locks older than this are considered abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(600);

/// Held for the duration of one build; the file is removed on drop.
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
}

impl SnapshotLock {
    /// Acquire the lock, reclaiming a stale one. Fails fast with
    /// [`SnapshotError::Locked`] when a fresh lock exists.
    pub fn acquire(path: &Path) -> Result<Self, SnapshotError> {
        Self::acquire_with_staleness(path, STALE_AFTER)
    }

    pub(crate) fn acquire_with_staleness(
        path: &Path,
        stale_after: Duration,
    ) -> Result<Self, SnapshotError> {
        if path.exists() {
            match lock_age(path) {
                Some(age) if age > stale_after => {
                    warn!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "removing stale snapshot lock"
                    );
                    std::fs::remove_file(path)?;
                }
                _ => return Err(SnapshotError::Locked(path.display().to_string())),
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SnapshotError::Locked(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let stamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        writeln!(file, "{}|{}", std::process::id(), stamp)?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Whether a lock file currently exists at `path`.
    pub fn is_held(path: &Path) -> bool {
        path.exists()
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove snapshot lock");
        }
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

/// Remove an abandoned lock at startup. Fresh locks are left alone; they
/// may belong to a live builder in another process.
pub fn remove_if_stale(path: &Path) {
    if !path.exists() {
        return;
    }
    match lock_age(path) {
        Some(age) if age > STALE_AFTER => {
            warn!(path = %path.display(), "removing stale snapshot lock at startup");
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove stale lock");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.lock");

        {
            let _lock = SnapshotLock::acquire(&path).unwrap();
            assert!(SnapshotLock::is_held(&path));
        }
        // Dropping the guard removes the file.
        assert!(!SnapshotLock::is_held(&path));
    }

    #[test]
    fn test_second_acquire_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.lock");

        let _lock = SnapshotLock::acquire(&path).unwrap();
        let err = SnapshotLock::acquire(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::Locked(_)));
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.lock");

        std::fs::write(&path, "12345|0").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        // With a zero staleness threshold the existing lock is stale.
        let lock = SnapshotLock::acquire_with_staleness(&path, Duration::ZERO);
        assert!(lock.is_ok());
    }
}

//! Exclusive cross-process lock for snapshot files.
//!
//! The lock is a sidecar file `<snapshot>.lock` created with `create_new`, so
//! only one process can hold it at a time. It is removed when the guard is
//! dropped. A lock file older than `STALE_AFTER` is assumed to belong to a
//! crashed process and is reclaimed: it is renamed aside, and put back if the
//! renamed file turns out to be a fresh lock taken since the staleness check.
//!
//! Two processes can still both hold the lock if a third creates a new lock
//! between the rename and the restore. Snapshot writes stay atomic either way.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::error::StateError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
}

impl SnapshotLock {
    pub fn lock_path_for(snapshot: &Path) -> PathBuf {
        let mut name = snapshot
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        snapshot.with_file_name(name)
    }

    /// Block until the lock is acquired or `timeout` elapses.
    pub fn acquire(snapshot: &Path, timeout: Duration) -> Result<Self, StateError> {
        let path = Self::lock_path_for(snapshot);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    tracing::trace!(lock = %path.display(), "snapshot lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let owner = fs::read_to_string(&path).ok();
                    if is_stale(&path) {
                        tracing::warn!(lock = %path.display(), "reclaiming stale snapshot lock");
                        reclaim(&path, owner.as_deref());
                        continue;
                    }
                    if start.elapsed() >= timeout {
                        return Err(StateError::LockTimeout {
                            path: path.display().to_string(),
                            waited_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(StateError::io(&path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release snapshot lock");
        }
    }
}

/// Move a lock judged stale out of the way. `owner` is the content read
/// when it was judged stale; a different owner or a fresh mtime means the
/// lock was replaced meanwhile and is restored.
fn reclaim(path: &Path, owner: Option<&str>) {
    let mut aside = path.as_os_str().to_os_string();
    aside.push(format!(".stale.{}", std::process::id()));
    let aside = PathBuf::from(aside);

    if fs::rename(path, &aside).is_err() {
        // Released or reclaimed by someone else.
        return;
    }
    let taken = fs::read_to_string(&aside).ok();
    if taken.as_deref() != owner || !is_stale(&aside) {
        tracing::debug!(lock = %path.display(), "lock was renewed, restoring it");
        if let Err(e) = fs::hard_link(&aside, path) {
            tracing::warn!(lock = %path.display(), error = %e, "failed to restore renewed snapshot lock");
        }
    }
    let _ = fs::remove_file(&aside);
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

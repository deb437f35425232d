//! Advisory single-writer lock: a pid file created on open, removed on
//! close (and registered so it is cleaned up if the process exits without
//! an explicit `close()`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FilesError, Result};

pub struct LockFile {
    path: PathBuf,
    held: bool,
}

impl LockFile {
    /// Acquires the lock at `path`, failing with
    /// [`FilesError::Locked`] if another live process already holds it.
    /// A lock file left behind by a process that is no longer running is
    /// treated as stale and silently reclaimed.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(existing_pid) = read_pid(&path) {
            if is_process_alive(existing_pid) {
                return Err(FilesError::Locked(existing_pid));
            }
            tracing::warn!(pid = existing_pid, "reclaiming stale lock file");
        }
        fs::write(&path, std::process::id().to_string())?;
        Ok(LockFile { path, held: true })
    }

    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.held {
            let _ = fs::remove_file(&self.path);
            self.held = false;
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.do_release();
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

/// Best-effort liveness probe. On Unix this is `kill(pid, 0)`, which
/// succeeds (no signal sent) iff a process with that pid exists and is
/// visible to us. On other targets there is no equivalent syscall
/// available here, so a lock file that exists is conservatively treated
/// as held.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // SAFETY: `kill` with signal 0 sends no signal; it only performs the
    // existence/permission check, which is why this probe is safe to run
    // against a pid we do not otherwise control.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_release_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".filemanager.lock");
        let lock = LockFile::acquire(&path).unwrap();
        assert!(path.exists());
        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn reclaims_stale_lock_from_dead_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".filemanager.lock");
        // pid 0 is never a live, kill-able user process on the probe.
        fs::write(&path, "999999999").unwrap();
        let lock = LockFile::acquire(&path);
        assert!(lock.is_ok());
    }
}

//! Process-level mutual exclusion over the archive root.
//!
//! The lock is a file created with `create_new` that records the owner's pid
//! and is held with an advisory exclusive lock for its whole life. A lock file
//! whose advisory lock is free and whose recorded pid is missing or no longer
//! alive is stale and gets reclaimed.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Outcome of a lock attempt. `Busy` is a normal outcome, not an error.
#[derive(Debug)]
pub enum LockState {
    Acquired(LockGuard),
    Busy { pid: u32 },
}

pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LockManager { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock, reclaiming a stale one at most once.
    pub fn acquire(&self) -> Result<LockState> {
        self.try_acquire(true)
    }

    fn try_acquire(&self, may_reclaim: bool) -> Result<LockState> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if file.try_lock_exclusive().is_err() {
                    // A contender grabbed the fresh file before us; it decides its fate
                    return Ok(LockState::Busy {
                        pid: read_owner(&self.path).unwrap_or(0),
                    });
                }

                let pid = std::process::id();
                writeln!(file, "{pid}")?;
                file.flush()?;

                // The path must still name the file we hold
                if !names_same_file(&file, &self.path) {
                    return Ok(LockState::Busy {
                        pid: read_owner(&self.path).unwrap_or(0),
                    });
                }

                log::debug!("Acquired archive lock {} (pid {pid})", self.path.display());
                Ok(LockState::Acquired(LockGuard {
                    file: Some(file),
                    path: self.path.clone(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.handle_existing(may_reclaim),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to create lock file {}", self.path.display())
            }),
        }
    }

    fn handle_existing(&self, may_reclaim: bool) -> Result<LockState> {
        let existing = match File::open(&self.path) {
            Ok(file) => file,
            // Released between our create and open
            Err(e) if e.kind() == ErrorKind::NotFound => return self.try_acquire(false),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open lock file {}", self.path.display()))
            }
        };

        // A held advisory lock means a live owner, whatever the file says
        if existing.try_lock_exclusive().is_err() {
            let owner = read_owner(&self.path).unwrap_or(0);
            log::info!("Archive is locked by running process {owner}");
            return Ok(LockState::Busy { pid: owner });
        }

        let owner = read_owner(&self.path).unwrap_or(0);
        if owner != 0 && is_process_alive(owner) {
            log::info!("Archive is locked by running process {owner}");
            return Ok(LockState::Busy { pid: owner });
        }

        if !may_reclaim {
            return Ok(LockState::Busy { pid: owner });
        }

        log::warn!(
            "Removing stale archive lock {} (owner pid {owner} is not running)",
            self.path.display()
        );
        let removed = fs::remove_file(&self.path);
        drop(existing);
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove stale lock {}", self.path.display())
                })
            }
        }

        self.try_acquire(false)
    }
}

/// RAII guard; dropping it releases the advisory lock and removes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Unlink before unlocking so nobody can flock a file about to vanish
        let _ = fs::remove_file(&self.path);
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
        log::debug!("Released archive lock {}", self.path.display());
    }
}

/// Remove the lock file if this process owns it.
///
/// Used from the termination-signal handler, where destructors do not run.
pub fn release_if_owned(path: &Path) {
    if read_owner(path) == Some(std::process::id()) {
        let _ = fs::remove_file(path);
    }
}

#[cfg(unix)]
fn names_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(named)) => held.dev() == named.dev() && held.ino() == named.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn names_same_file(_file: &File, path: &Path) -> bool {
    // Open files cannot be deleted here, so the path can only be ours
    path.exists()
}

fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Check if a process with the given pid is still alive.
#[cfg(target_os = "linux")]
pub fn is_process_alive(pid: u32) -> bool {
    // /proc/<pid>/stat disappears once the process has been reaped
    Path::new(&format!("/proc/{pid}/stat")).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    // No cheap liveness probe; stale locks must be removed by hand
    true
}

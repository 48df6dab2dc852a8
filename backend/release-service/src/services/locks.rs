//! Per-target mutual exclusion
//!
//! Two releases against the same bucket are serialised so their uploads and
//! deletes never interleave on the public origin. Within a process an async
//! mutex per bucket does this; with a lock directory configured, an advisory
//! `flock` on `{lock_dir}/{bucket}.lock` also serialises separate processes
//! on the same host.

use crate::error::{ReleaseError, Result};
use dashmap::DashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

/// Poll interval while another process holds the lock file
const LOCK_FILE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Holds a target until dropped
pub struct TargetGuard {
    _local: OwnedMutexGuard<()>,
    // Closing the file releases the flock
    _file: Option<File>,
}

#[derive(Clone, Default)]
pub struct TargetLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    lock_dir: Option<PathBuf>,
}

impl TargetLocks {
    /// In-process locks only
    pub fn new() -> Self {
        Self::default()
    }

    /// Also take a lock file per target under `dir`, shared by every process using it
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn lock_dir(&self) -> Option<&Path> {
        self.lock_dir.as_deref()
    }

    /// Wait for exclusive use of `target`; released when the guard drops
    pub async fn acquire(&self, target: &str) -> Result<TargetGuard> {
        let lock = self
            .locks
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let local = match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!(target_bucket = %target, "Waiting for in-flight release on target");
                lock.lock_owned().await
            }
        };

        let file = match &self.lock_dir {
            Some(dir) => Some(self.acquire_file(dir, target).await?),
            None => None,
        };

        Ok(TargetGuard {
            _local: local,
            _file: file,
        })
    }

    async fn acquire_file(&self, dir: &Path, target: &str) -> Result<File> {
        let path = lock_path(dir, target);
        let file = open_lock_file(&path).map_err(|e| lock_error(&path, e))?;

        let mut waiting = false;
        loop {
            match try_flock_exclusive(&file) {
                Ok(true) => return Ok(file),
                Ok(false) => {
                    if !waiting {
                        info!(
                            target_bucket = %target,
                            lock_file = %path.display(),
                            "Waiting for release in another process"
                        );
                        waiting = true;
                    }
                    tokio::time::sleep(LOCK_FILE_POLL_INTERVAL).await;
                }
                Err(e) => return Err(lock_error(&path, e)),
            }
        }
    }

    /// Whether a release currently holds `target`, in this process or another
    pub fn is_locked(&self, target: &str) -> bool {
        let local = self
            .locks
            .get(target)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false);
        if local {
            return true;
        }

        match &self.lock_dir {
            Some(dir) => {
                let path = lock_path(dir, target);
                path.exists()
                    && open_lock_file(&path)
                        .and_then(|file| try_flock_exclusive(&file))
                        .map(|acquired| !acquired)
                        .unwrap_or(false)
            }
            None => false,
        }
    }
}

fn lock_path(dir: &Path, target: &str) -> PathBuf {
    // Bucket names are lowercase alphanumerics, dots and hyphens
    let name: String = target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!("{}.lock", name))
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

fn lock_error(path: &Path, err: io::Error) -> ReleaseError {
    ReleaseError::Configuration(format!(
        "cannot lock release target through {}: {}",
        path.display(),
        err
    ))
}

/// Non-blocking exclusive flock; `Ok(false)` when another holder has it
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor is owned by `file` and stays open for the call
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::{DaemonError, DaemonResult};

/// Exclusive single-instance lock on a well-known file.
///
/// The lock is advisory and scoped to the open file description, so it
/// follows the descriptor across `fork` and `dup`: the daemon lineage keeps
/// the launcher's acquisition without re-acquiring it, while any other
/// process opening the same path is refused. Dropping the handle closes the
/// descriptor, which is the only way the lock is ever released; there is no
/// unlock call.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    /// Opens `path` (creating it 0600 if absent) and takes the exclusive
    /// lock without blocking.
    ///
    /// A lock held elsewhere yields [`DaemonError::AlreadyRunning`]; a path
    /// that cannot be opened yields [`DaemonError::LockFileUnavailable`].
    pub fn acquire(path: &Path) -> DaemonResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)
            .map_err(|source| DaemonError::LockFileUnavailable {
                path: path.to_path_buf(),
                source,
            })?;

        // SAFETY: the descriptor is owned by `file` and stays open here.
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == -1 {
            let err = io::Error::last_os_error();
            return Err(if err.kind() == io::ErrorKind::WouldBlock {
                DaemonError::AlreadyRunning {
                    path: path.to_path_buf(),
                }
            } else {
                DaemonError::Syscall {
                    call: "flock",
                    source: err,
                }
            });
        }

        Ok(InstanceLock { file })
    }

    /// Gives up RAII management, leaving the descriptor and its lock open
    /// for the remaining lifetime of the process.
    ///
    /// The daemon lineage calls this once it has reached its final identity,
    /// so no scope can release the lock before exit.
    pub fn leak(self) {
        mem::forget(self.file);
    }
}

impl AsRawFd for InstanceLock {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

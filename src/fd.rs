use std::fs;
use std::io;
use std::os::fd::RawFd;

use crate::error::{DaemonError, DaemonResult};

/// Descriptor-table introspection point on procfs systems.
const PROC_FD_DIR: &str = "/proc/self/fd";

/// Bound used when the soft descriptor limit reports unlimited.
const FALLBACK_FD_CEILING: libc::rlim_t = 65_536;

/// Closes every open descriptor above the standard three.
///
/// Descriptors 0, 1 and 2 are always preserved; `keep` lists additional
/// exemptions such as a held instance lock. The descriptor table is
/// enumerated through procfs when available; otherwise every descriptor in
/// `[3, soft limit)` is closed unconditionally. Close errors on individual
/// descriptors are ignored, so numbers that were never open are a no-op.
pub fn close_all_except(keep: &[RawFd]) -> DaemonResult<()> {
    match live_descriptors() {
        Ok(fds) => {
            for fd in fds {
                if fd > 2 && !keep.contains(&fd) {
                    // SAFETY: raw close of a descriptor number; errors ignored.
                    unsafe { libc::close(fd) };
                }
            }
            Ok(())
        }
        Err(_) => close_descriptor_range(keep),
    }
}

/// Numeric entries of the procfs descriptor directory.
///
/// The list is collected in full before anything is closed, so the directory
/// handle used for the walk is itself already closed by the time a caller
/// acts on the result (its number may appear in the list; closing it again
/// is a no-op).
fn live_descriptors() -> io::Result<Vec<RawFd>> {
    let mut fds = Vec::new();
    for entry in fs::read_dir(PROC_FD_DIR)? {
        let entry = entry?;
        if let Some(fd) = entry.file_name().to_str().and_then(|name| name.parse().ok()) {
            fds.push(fd);
        }
    }
    Ok(fds)
}

/// Fallback without procfs: close the whole candidate range below the soft
/// descriptor limit.
fn close_descriptor_range(keep: &[RawFd]) -> DaemonResult<()> {
    let mut limits = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: limits points at a writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limits) } == -1 {
        return Err(DaemonError::ResourceSanitization {
            what: "descriptor limit query",
            source: io::Error::last_os_error(),
        });
    }
    let ceiling = if limits.rlim_cur == libc::RLIM_INFINITY {
        FALLBACK_FD_CEILING
    } else {
        limits.rlim_cur
    };
    let ceiling = ceiling.min(libc::c_int::MAX as libc::rlim_t) as RawFd;
    for fd in 3..ceiling {
        if !keep.contains(&fd) {
            // SAFETY: closing candidate numbers; EBADF is expected and ignored.
            unsafe { libc::close(fd) };
        }
    }
    Ok(())
}

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ready::FailureStage;

/// Everything that can go wrong while turning the calling process into a
/// daemon.
///
/// Failures that happen in the daemon lineage after the readiness channel is
/// open arrive as [`DaemonError::Init`] carrying the reported stage;
/// everything earlier is diagnosed directly in the launcher.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Another live process holds the instance lock.
    #[error("already running: another instance holds the lock on {}", .path.display())]
    AlreadyRunning { path: PathBuf },

    /// The lock file itself could not be opened or created.
    #[error("cannot open lock file {}: {source}", .path.display())]
    LockFileUnavailable { path: PathBuf, source: io::Error },

    /// Descriptor or signal-state sanitization failed before any fork.
    #[error("resource sanitization failed ({what}): {source}")]
    ResourceSanitization { what: &'static str, source: io::Error },

    /// A process-control primitive failed before the readiness channel
    /// carried any verdict.
    #[error("{call} failed: {source}")]
    Syscall { call: &'static str, source: io::Error },

    /// The daemon lineage reported a failure stage over the readiness
    /// channel.
    #[error("daemon initialization failed while {0}")]
    Init(FailureStage),

    /// The daemon lineage exited without reporting any status.
    #[error("readiness channel closed before a status was reported")]
    ChannelClosed,

    /// Remaining I/O failures (path resolution and similar).
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Specialized result type used across the crate.
pub type DaemonResult<T> = Result<T, DaemonError>;

//! The readiness handshake: a unidirectional pipe from the eventual daemon
//! back to the launcher, carrying exactly one status token per attempt.

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::{DaemonError, DaemonResult};

/// Upper bound for one wire token: an ASCII decimal code plus terminator.
const TOKEN_MAX: usize = 8;

/// Initialization stage reported over the readiness channel when the daemon
/// lineage fails.
///
/// The discriminants are the wire codes and are stable. Codes 4, 5 and 8
/// are reserved: older wire revisions reported each standard stream and each
/// PID-file step separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FailureStage {
    /// `setsid` failed; the first child could not become a session leader.
    SessionCreate = 1,
    /// The session leader could not fork the final daemon process.
    SecondFork = 2,
    /// Rebinding stdin/stdout/stderr to the null device failed.
    StreamRebind = 3,
    /// The daemon could not change its working directory to `/`.
    WorkdirChange = 6,
    /// The PID file could not be created or written.
    PidFileWrite = 7,
    /// The configured unprivileged user could not be resolved.
    PrivilegeLookup = 9,
    /// Switching to the configured unprivileged user failed.
    PrivilegeSwitch = 10,
}

impl FailureStage {
    /// Stable wire code for this stage.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => FailureStage::SessionCreate,
            2 => FailureStage::SecondFork,
            3 => FailureStage::StreamRebind,
            6 => FailureStage::WorkdirChange,
            7 => FailureStage::PidFileWrite,
            9 => FailureStage::PrivilegeLookup,
            10 => FailureStage::PrivilegeSwitch,
            _ => return None,
        })
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            FailureStage::SessionCreate => "creating a new session",
            FailureStage::SecondFork => "forking the final daemon process",
            FailureStage::StreamRebind => "rebinding standard streams to the null device",
            FailureStage::WorkdirChange => "changing the working directory to /",
            FailureStage::PidFileWrite => "writing the PID file",
            FailureStage::PrivilegeLookup => "resolving the target user",
            FailureStage::PrivilegeSwitch => "switching to the target user",
        };
        f.write_str(what)
    }
}

/// One readiness verdict. Exactly one of these crosses the channel per
/// daemonization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The daemon finished every initialization step.
    Ready,
    /// Initialization failed at the given stage.
    Failed(FailureStage),
}

impl Readiness {
    /// Wire form: the ASCII decimal code, NUL terminated.
    fn encode(self) -> Vec<u8> {
        let code = match self {
            Readiness::Ready => 0,
            Readiness::Failed(stage) => stage.code(),
        };
        let mut token = code.to_string().into_bytes();
        token.push(0);
        token
    }

    fn decode(raw: &[u8]) -> Option<Self> {
        let token = raw.split(|&b| b == 0).next().unwrap_or(raw);
        let code: u8 = std::str::from_utf8(token).ok()?.parse().ok()?;
        if code == 0 {
            return Some(Readiness::Ready);
        }
        FailureStage::from_code(code).map(Readiness::Failed)
    }
}

/// Opens the channel. Called before the first fork so both lineages share
/// the two ends; each side then drops the end it does not use, which is the
/// close discipline the handshake depends on.
pub(crate) fn channel() -> DaemonResult<(ReadyReader, ReadyNotifier)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds points at two writable ints for the duration of the call.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(DaemonError::Syscall {
            call: "pipe",
            source: io::Error::last_os_error(),
        });
    }
    // SAFETY: on success both descriptors are open and not owned elsewhere.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok((ReadyReader { fd: read }, ReadyNotifier { fd: write }))
}

/// Launcher-side end of the readiness channel.
#[derive(Debug)]
pub(crate) struct ReadyReader {
    fd: OwnedFd,
}

impl ReadyReader {
    /// Blocks until the daemon lineage reports, then maps the token.
    ///
    /// EOF without a token means the writing lineage died first. A token
    /// that does not decode is reported as invalid data, not as a closed
    /// channel.
    pub(crate) fn recv(self) -> DaemonResult<Readiness> {
        let mut buf = [0u8; TOKEN_MAX];
        let n = loop {
            // SAFETY: buf outlives the call and its length bounds the read.
            let rc =
                unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if rc >= 0 {
                break rc as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(DaemonError::Syscall {
                    call: "read",
                    source: err,
                });
            }
        };
        if n == 0 {
            return Err(DaemonError::ChannelClosed);
        }
        Readiness::decode(&buf[..n]).ok_or_else(|| {
            DaemonError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "malformed readiness token",
            ))
        })
    }
}

/// Daemon-side end of the readiness channel.
///
/// `report` consumes the notifier, so the exactly-once invariant holds by
/// construction.
#[derive(Debug)]
pub(crate) struct ReadyNotifier {
    fd: OwnedFd,
}

impl ReadyNotifier {
    /// Writes the whole token, retrying partial writes and interruptions.
    pub(crate) fn report(self, verdict: Readiness) -> io::Result<()> {
        let token = verdict.encode();
        let mut written = 0;
        while written < token.len() {
            // SAFETY: the range stays inside token for the whole call.
            let rc = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    token[written..].as_ptr().cast(),
                    token.len() - written,
                )
            };
            match rc {
                n if n > 0 => written += n as usize,
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "pipe write returned zero",
                    ));
                }
                _ => {
                    let err = io::Error::last_os_error();
                    if err.kind() != io::ErrorKind::Interrupted {
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }
}

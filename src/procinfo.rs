use std::fmt;

/// Point-in-time snapshot of the process's position in the process tree.
///
/// Read on demand and never cached: every value here changes across the
/// forks performed during daemonization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: libc::pid_t,
    pub ppid: libc::pid_t,
    pub pgid: libc::pid_t,
    pub sid: libc::pid_t,
}

impl ProcessIdentity {
    /// Queries the identity of the calling process.
    pub fn current() -> Self {
        // SAFETY: identity queries on the calling process cannot fail.
        unsafe {
            ProcessIdentity {
                pid: libc::getpid(),
                ppid: libc::getppid(),
                pgid: libc::getpgrp(),
                sid: libc::getsid(0),
            }
        }
    }

    /// True when this process leads its own session.
    pub fn is_session_leader(&self) -> bool {
        self.pid == self.sid
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} ppid={} pgid={} sid={}",
            self.pid, self.ppid, self.pgid, self.sid
        )
    }
}

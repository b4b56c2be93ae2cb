use std::ffi::CString;
use std::io;

/// Which side of the daemonization forks the calling code is on.
///
/// [`SmithDaemon::start`](crate::SmithDaemon::start) returns in two
/// processes. The launcher keeps the original controlling terminal and
/// normally exits straight away; the daemon runs detached and holds the
/// instance lock for the rest of its life.
#[must_use = "start() returns in two processes; ignoring the role runs launcher code in the daemon"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The original foreground process. The daemon is confirmed ready.
    Launcher,
    /// The detached daemon process.
    Daemon,
}

/// Privilege-drop target, referenced by account name.
///
/// Resolution happens at daemonization time, not at configuration time, so
/// a bad name surfaces through the readiness handshake like any other
/// startup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User(String);

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        User(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Looks the account up in the system user database.
    pub(crate) fn resolve(&self) -> io::Result<libc::uid_t> {
        let name = CString::new(self.0.as_str()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "user name contains a NUL byte",
            )
        })?;
        // SAFETY: name is a valid C string and the record is read before any
        // other call can overwrite the lookup buffer.
        let record = unsafe { libc::getpwnam(name.as_ptr()) };
        if record.is_null() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown user {}", self.0),
            ));
        }
        // SAFETY: non-null record returned by getpwnam.
        Ok(unsafe { (*record).pw_uid })
    }
}

impl From<&str> for User {
    fn from(name: &str) -> Self {
        User(name.to_string())
    }
}

impl From<String> for User {
    fn from(name: String) -> Self {
        User(name)
    }
}

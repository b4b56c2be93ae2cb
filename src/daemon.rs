use std::path::{Path, PathBuf};

use crate::detach;
use crate::env::DEFAULT_PATH;
use crate::error::DaemonResult;
use crate::types::{Role, User};

/// Default directory for instance lock files.
const RUN_LOCK_DIR: &str = "/run/lock";
/// Default directory for pid files.
const RUN_DIR: &str = "/run";

/// Main constructor to configure and launch the daemon process.
#[derive(Debug, Clone)]
pub struct SmithDaemon {
    pub(crate) name: Option<String>,
    pub(crate) lock_path: Option<PathBuf>,
    pub(crate) pid_path: Option<PathBuf>,
    pub(crate) user: Option<User>,
    pub(crate) env_vars: Vec<(String, String)>,
}

impl Default for SmithDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl SmithDaemon {
    /// Creates a new default configuration.
    ///
    /// # Defaults
    /// - Name: the current executable's file stem
    /// - Lock file: `/run/lock/<name>.lock`
    /// - PID file: `/run/<name>.pid`
    /// - Environment: `PATH=/usr/bin:/bin:/usr/sbin:/sbin`, nothing else
    /// - No privilege drop
    pub fn new() -> Self {
        SmithDaemon {
            name: None,
            lock_path: None,
            pid_path: None,
            user: None,
            env_vars: vec![("PATH".to_owned(), DEFAULT_PATH.to_owned())],
        }
    }

    // --- Public Getters ---

    /// Returns the daemon name if set.
    pub fn get_name(&self) -> Option<&str> { self.name.as_deref() }

    /// Returns the configured lock file path, if any.
    pub fn lock_file_path(&self) -> Option<&Path> { self.lock_path.as_deref() }

    /// Returns the configured PID file path, if any.
    pub fn pid_file_path(&self) -> Option<&Path> { self.pid_path.as_deref() }

    /// Returns the variables the daemon's environment will be rebuilt from.
    pub fn environment(&self) -> &[(String, String)] { &self.env_vars }

    // --- Builder Methods ---

    /// Sets the daemon name, used to derive the default lock and PID paths.
    pub fn name(mut self, name: &str) -> Self { self.name = Some(name.to_owned()); self }

    /// Sets the path of the single-instance lock file.
    pub fn lock_file<P: Into<PathBuf>>(mut self, path: P) -> Self { self.lock_path = Some(path.into()); self }

    /// Sets the path to the PID file.
    pub fn pid_file<P: Into<PathBuf>>(mut self, path: P) -> Self { self.pid_path = Some(path.into()); self }

    /// Sets the user to run the daemon as (privilege dropping).
    pub fn user<U: Into<User>>(mut self, user: U) -> Self { self.user = Some(user.into()); self }

    /// Adds an environment variable to the sanitized set.
    ///
    /// The daemon's environment is rebuilt from scratch; only `PATH` and
    /// pairs added here survive into the daemon. Duplicate keys are
    /// installed in order, so the last addition wins.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env_vars.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Carries one inherited variable into the sanitized set, if present.
    pub fn env_keep(mut self, key: &str) -> Self {
        if let Ok(value) = std::env::var(key) {
            self.env_vars.push((key.to_owned(), value));
        }
        self
    }

    /// Starts the daemonization sequence.
    ///
    /// Must be called before any threads are spawned: the sequence forks,
    /// and only the calling thread survives into the daemon. Returns in two
    /// processes; match on the [`Role`] to tell them apart. The launcher
    /// side returns only once the daemon has confirmed readiness, so by the
    /// time it sees `Ok(Role::Launcher)` the PID file exists and privileges
    /// are dropped.
    ///
    /// ```no_run
    /// use daemon_smith::{Role, SmithDaemon};
    ///
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     match SmithDaemon::new().name("smithd").start()? {
    ///         Role::Launcher => Ok(()),
    ///         Role::Daemon => {
    ///             // steady-state service loop
    ///             Ok(())
    ///         }
    ///     }
    /// }
    /// ```
    pub fn start(self) -> DaemonResult<Role> {
        detach::start(self)
    }

    // --- Default resolution ---

    pub(crate) fn effective_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "daemon".to_owned())
    }

    pub(crate) fn effective_lock_path(&self, name: &str) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| Path::new(RUN_LOCK_DIR).join(format!("{name}.lock")))
    }

    pub(crate) fn effective_pid_path(&self, name: &str) -> PathBuf {
        self.pid_path
            .clone()
            .unwrap_or_else(|| Path::new(RUN_DIR).join(format!("{name}.pid")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_paths_from_the_name() {
        let config = SmithDaemon::new().name("forged");
        assert_eq!(config.effective_name(), "forged");
        assert_eq!(
            config.effective_lock_path("forged"),
            PathBuf::from("/run/lock/forged.lock")
        );
        assert_eq!(
            config.effective_pid_path("forged"),
            PathBuf::from("/run/forged.pid")
        );
    }

    #[test]
    fn explicit_paths_override_the_derived_defaults() {
        let config = SmithDaemon::new()
            .lock_file("/tmp/a.lock")
            .pid_file("/tmp/a.pid");
        assert_eq!(config.effective_lock_path("x"), PathBuf::from("/tmp/a.lock"));
        assert_eq!(config.effective_pid_path("x"), PathBuf::from("/tmp/a.pid"));
    }

    #[test]
    fn the_minimum_search_path_is_always_seeded() {
        let config = SmithDaemon::new();
        assert_eq!(
            config.environment(),
            [("PATH".to_owned(), DEFAULT_PATH.to_owned())]
        );
    }

    #[test]
    fn env_keep_ignores_absent_variables() {
        let before = SmithDaemon::new().environment().len();
        let config = SmithDaemon::new().env_keep("SMITH_SURELY_UNSET_VARIABLE");
        assert_eq!(config.environment().len(), before);
    }

    #[test]
    fn the_default_name_comes_from_the_executable() {
        assert!(!SmithDaemon::new().effective_name().is_empty());
    }
}

//! # daemon_smith
//!
//! **daemon_smith** turns an ordinary foreground process into a correctly
//! detached, single-instance, privilege-reduced background service, the
//! classic SysV way: double fork, new session, sanitized descriptors and
//! environment, instance lock, PID file.
//!
//! The part that is easy to get wrong is startup ordering, so the launcher
//! blocks on a private readiness pipe until the fully initialized daemon
//! reports back. `start()` therefore returns in two processes and tags each
//! side with a [`Role`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use daemon_smith::{Role, Shutdown, SmithDaemon, run_loop};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     match SmithDaemon::new().name("smithd").start()? {
//!         // Parent: the daemon is up, its PID file written. Just leave.
//!         Role::Launcher => Ok(()),
//!         Role::Daemon => {
//!             let shutdown = Shutdown::install()?;
//!             run_loop(&shutdown, Duration::from_secs(5), |_| {
//!                 // periodic work
//!             });
//!             Ok(())
//!         }
//!     }
//! }
//! ```
//!
//! If any initialization stage fails in the daemon lineage, the launcher
//! gets `Err(DaemonError::Init(stage))` naming the exact stage instead of a
//! silently dead child. `start()` must run before any threads are spawned.

#[cfg(not(unix))]
compile_error!("daemon_smith only supports Unix targets");

mod daemon;
mod detach;
mod env;
mod error;
mod fd;
mod lock;
mod pidfile;
mod procinfo;
mod ready;
mod runtime;
mod types;

// Re-export public types to keep the API flat
pub use daemon::SmithDaemon;
pub use env::{DEFAULT_PATH, sanitize_environment};
pub use error::{DaemonError, DaemonResult};
pub use fd::close_all_except;
pub use lock::InstanceLock;
pub use pidfile::{read_pid_file, write_pid_file};
pub use procinfo::ProcessIdentity;
pub use ready::FailureStage;
pub use runtime::{Shutdown, run_loop};
pub use types::{Role, User};

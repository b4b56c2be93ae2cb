use std::io;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process;

use log::debug;

use crate::daemon::SmithDaemon;
use crate::env;
use crate::error::{DaemonError, DaemonResult};
use crate::fd;
use crate::lock::InstanceLock;
use crate::pidfile;
use crate::procinfo::ProcessIdentity;
use crate::ready::{self, FailureStage, Readiness, ReadyNotifier};
use crate::types::Role;

/// Tagged fork result so branches match on a role instead of on the sign of
/// a pid.
enum ForkOutcome {
    Parent(libc::pid_t),
    Child,
}

/// Runs the full detachment sequence.
///
/// Returns in two processes: the original launcher gets `Role::Launcher`
/// once the daemon has confirmed readiness, the detached grandchild gets
/// `Role::Daemon`. The intermediate session leader exits in here and never
/// reaches the caller. Any stage failure after the first fork travels back
/// over the readiness pipe and surfaces as `DaemonError::Init` in the
/// launcher.
pub(crate) fn start(config: SmithDaemon) -> DaemonResult<Role> {
    let name = config.effective_name();
    // Paths are fixed before the daemon trades its working directory for /.
    let lock_path = absolutize(config.effective_lock_path(&name))?;
    let pid_path = absolutize(config.effective_pid_path(&name))?;

    debug!("daemonizing {name}: {}", ProcessIdentity::current());

    let lock = InstanceLock::acquire(&lock_path)?;
    fd::close_all_except(&[lock.as_raw_fd()])?;
    reset_signals()?;
    env::sanitize_environment(&config.env_vars);
    debug!("descriptors, signal state and environment sanitized");

    let (reader, notifier) = ready::channel()?;

    match fork()? {
        ForkOutcome::Parent(child) => {
            drop(notifier);
            // The inherited descriptor keeps the lock held in the daemon
            // lineage; the launcher holds nothing from here on.
            drop(lock);
            debug!("daemon lineage {child} forked, waiting for its verdict");
            return match reader.recv()? {
                Readiness::Ready => Ok(Role::Launcher),
                Readiness::Failed(stage) => Err(DaemonError::Init(stage)),
            };
        }
        ForkOutcome::Child => {}
    }
    drop(reader);

    // SAFETY: no memory is touched; failure is checked below.
    if unsafe { libc::setsid() } == -1 {
        report_and_exit(notifier, FailureStage::SessionCreate);
    }
    let leader = ProcessIdentity::current();
    debug_assert!(leader.is_session_leader());
    debug!("session created: {leader}");

    // The session leader must not live on or the daemon could reacquire a
    // controlling terminal.
    match fork() {
        Ok(ForkOutcome::Parent(_)) => process::exit(0),
        Ok(ForkOutcome::Child) => {}
        Err(_) => report_and_exit(notifier, FailureStage::SecondFork),
    }
    debug!("final daemon process: {}", ProcessIdentity::current());

    if rebind_standard_streams().is_err() {
        report_and_exit(notifier, FailureStage::StreamRebind);
    }
    // SAFETY: umask cannot fail.
    unsafe { libc::umask(0) };
    // SAFETY: NUL-terminated literal path.
    if unsafe { libc::chdir(c"/".as_ptr()) } == -1 {
        report_and_exit(notifier, FailureStage::WorkdirChange);
    }

    if pidfile::write_pid_file(&pid_path).is_err() {
        report_and_exit(notifier, FailureStage::PidFileWrite);
    }
    debug!("pid file written to {}", pid_path.display());

    if let Some(user) = &config.user {
        let uid = match user.resolve() {
            Ok(uid) => uid,
            Err(_) => report_and_exit(notifier, FailureStage::PrivilegeLookup),
        };
        // SAFETY: plain uid switch; failure is checked.
        if unsafe { libc::setuid(uid) } == -1 {
            report_and_exit(notifier, FailureStage::PrivilegeSwitch);
        }
        debug!("privileges dropped to {}", user.name());
    }

    // A dead launcher surfaces as EPIPE here; the daemon is viable either
    // way, so the verdict write is best effort.
    let _ = notifier.report(Readiness::Ready);
    lock.leak();
    Ok(Role::Daemon)
}

fn fork() -> DaemonResult<ForkOutcome> {
    // SAFETY: the process is single-threaded at this point, as the
    // public entry point requires.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(DaemonError::Syscall {
            call: "fork",
            source: io::Error::last_os_error(),
        }),
        0 => Ok(ForkOutcome::Child),
        pid => Ok(ForkOutcome::Parent(pid)),
    }
}

/// Delivers a failure stage to the waiting launcher and ends this lineage.
fn report_and_exit(notifier: ReadyNotifier, stage: FailureStage) -> ! {
    let _ = notifier.report(Readiness::Failed(stage));
    process::exit(1);
}

/// Restores default dispositions and clears the signal mask, so the daemon
/// starts from a known signal state no matter what the launcher inherited.
///
/// `SIGKILL` and `SIGSTOP` cannot be changed. `SIGPIPE` keeps the ignored
/// disposition installed by the Rust runtime, so writes to a dead peer fail
/// with `EPIPE` instead of killing the process.
fn reset_signals() -> DaemonResult<()> {
    for signum in 1..=highest_signal() {
        if matches!(signum, libc::SIGKILL | libc::SIGSTOP | libc::SIGPIPE) {
            continue;
        }
        // SAFETY: installs the default disposition; rejections on the few
        // reserved signal numbers are ignored.
        unsafe { libc::signal(signum, libc::SIG_DFL) };
    }

    let mut none = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: sigemptyset initializes the set before sigprocmask reads it.
    unsafe {
        libc::sigemptyset(none.as_mut_ptr());
        if libc::sigprocmask(libc::SIG_SETMASK, none.as_ptr(), std::ptr::null_mut()) == -1 {
            return Err(DaemonError::ResourceSanitization {
                what: "signal mask reset",
                source: io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn highest_signal() -> libc::c_int {
    libc::SIGRTMAX()
}

#[cfg(not(target_os = "linux"))]
fn highest_signal() -> libc::c_int {
    31
}

/// Rebinds descriptors 0, 1 and 2 to the null device.
fn rebind_standard_streams() -> io::Result<()> {
    // SAFETY: open/dup2/close on descriptors this process owns.
    unsafe {
        let fd = libc::open(c"/dev/null".as_ptr(), libc::O_RDWR);
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(fd, target) == -1 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
        }
        // With all standard streams closed at entry, open may have handed
        // out one of the target numbers itself.
        if fd > libc::STDERR_FILENO {
            libc::close(fd);
        }
    }
    Ok(())
}

fn absolutize(path: PathBuf) -> DaemonResult<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

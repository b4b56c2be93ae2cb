//! End-to-end tests driving the real smithd binary.
//!
//! The daemon survives its launcher, so every test that starts one arms a
//! [`Reaper`] first and disarms it only after the daemon is confirmed gone.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn smithd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_smithd"))
}

struct Scratch {
    dir: TempDir,
    lockfile: PathBuf,
    pidfile: PathBuf,
}

fn scratch() -> Scratch {
    let dir = tempfile::tempdir().unwrap();
    let lockfile = dir.path().join("smithd.lock");
    let pidfile = dir.path().join("smithd.pid");
    Scratch {
        dir,
        lockfile,
        pidfile,
    }
}

/// Runs the launcher to completion; its exit is the readiness verdict.
fn launch(scratch: &Scratch, extra: &[&str]) -> Output {
    smithd()
        .arg("--daemon")
        .arg("--lockfile")
        .arg(&scratch.lockfile)
        .arg("--pidfile")
        .arg(&scratch.pidfile)
        .arg("--interval")
        .arg("1")
        .args(extra)
        .output()
        .unwrap()
}

fn recorded_pid(scratch: &Scratch) -> i32 {
    daemon_smith::read_pid_file(&scratch.pidfile).unwrap() as i32
}

fn alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    // A zombie still answers signal 0; count it as gone.
    #[cfg(target_os = "linux")]
    if let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) {
        return !stat.contains(") Z ");
    }
    true
}

fn terminate(pid: i32) {
    // SAFETY: directed at the daemon this test started.
    unsafe { libc::kill(pid, libc::SIGTERM) };
}

fn wait_until_gone(pid: i32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if !alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    !alive(pid)
}

/// Kills a stray daemon if an assertion fires before the orderly shutdown.
struct Reaper {
    pid: i32,
    armed: bool,
}

impl Reaper {
    fn new(pid: i32) -> Self {
        Reaper { pid, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if self.armed {
            // SAFETY: last-resort cleanup of the test's own daemon.
            unsafe { libc::kill(self.pid, libc::SIGKILL) };
        }
    }
}

#[test]
fn daemonizes_reports_ready_and_stops_on_sigterm() {
    let scratch = scratch();
    let out = launch(&scratch, &[]);
    assert!(
        out.status.success(),
        "launcher failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    // Readiness ordering: the pid file must already exist the moment the
    // launcher returns, and point at a live process.
    let pid = recorded_pid(&scratch);
    let reaper = Reaper::new(pid);
    assert!(alive(pid));

    terminate(pid);
    assert!(
        wait_until_gone(pid, Duration::from_secs(3)),
        "daemon survived SIGTERM past one loop interval"
    );
    reaper.disarm();
}

#[test]
fn a_second_instance_is_refused_while_the_first_holds_the_lock() {
    let scratch = scratch();
    let first = launch(&scratch, &[]);
    assert!(first.status.success());
    let pid = recorded_pid(&scratch);
    let reaper = Reaper::new(pid);

    let second = launch(&scratch, &[]);
    assert!(!second.status.success());
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("already running"), "stderr: {stderr}");
    // The losing instance never got far enough to touch the pid file.
    assert_eq!(recorded_pid(&scratch), pid);

    terminate(pid);
    assert!(wait_until_gone(pid, Duration::from_secs(3)));
    reaper.disarm();
}

#[test]
fn an_unknown_privilege_target_fails_with_a_stable_stage() {
    let scratch = scratch();
    let first = launch(&scratch, &["--user", "smith_no_such_account"]);
    assert!(!first.status.success());
    let message = String::from_utf8_lossy(&first.stderr).into_owned();
    assert!(message.contains("resolving the target user"), "stderr: {message}");

    // The attempt recorded its pid before failing, then exited; nothing may
    // still run under that pid.
    let pid = recorded_pid(&scratch);
    assert!(wait_until_gone(pid, Duration::from_secs(3)));

    // Same failure, same report.
    let second = launch(&scratch, &["--user", "smith_no_such_account"]);
    assert_eq!(String::from_utf8_lossy(&second.stderr), message);

    // Both failed attempts released the lock when they exited.
    let third = launch(&scratch, &[]);
    assert!(
        third.status.success(),
        "lock not released: {}",
        String::from_utf8_lossy(&third.stderr)
    );
    let live = recorded_pid(&scratch);
    let reaper = Reaper::new(live);
    terminate(live);
    assert!(wait_until_gone(live, Duration::from_secs(3)));
    reaper.disarm();
}

#[test]
fn an_unwritable_pid_path_fails_with_the_pid_file_stage() {
    let scratch = scratch();
    let pidfile = scratch.dir.path().join("missing").join("smithd.pid");
    let out = smithd()
        .arg("--daemon")
        .arg("--lockfile")
        .arg(&scratch.lockfile)
        .arg("--pidfile")
        .arg(&pidfile)
        .arg("--interval")
        .arg("1")
        .output()
        .unwrap();

    assert!(!out.status.success());
    let message = String::from_utf8_lossy(&out.stderr);
    assert!(message.contains("writing the PID file"), "stderr: {message}");

    // The daemon lineage must not have created anything on the way out.
    assert!(!pidfile.exists());
    assert!(!pidfile.parent().unwrap().exists());
}

#[test]
fn foreground_mode_heartbeats_to_stdout_until_terminated() {
    let child = smithd()
        .arg("--interval")
        .arg("1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id() as i32;

    thread::sleep(Duration::from_millis(1200));
    // SAFETY: directed at the child this test spawned.
    unsafe { libc::kill(pid, libc::SIGHUP) };
    thread::sleep(Duration::from_millis(1100));
    unsafe { libc::kill(pid, libc::SIGTERM) };

    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("started:"), "stdout: {stdout}");
    assert!(stdout.contains("tick"), "stdout: {stdout}");
    assert!(stdout.contains("reload requested"), "stdout: {stdout}");
    assert!(stdout.contains("stopping"), "stdout: {stdout}");
}

#[cfg(target_os = "linux")]
#[test]
fn detached_process_hygiene_via_proc() {
    let scratch = scratch();
    let out = launch(&scratch, &[]);
    assert!(out.status.success());
    let pid = recorded_pid(&scratch);
    let reaper = Reaper::new(pid);

    let proc_dir = PathBuf::from(format!("/proc/{pid}"));

    // Working directory traded for the filesystem root.
    assert_eq!(
        fs::read_link(proc_dir.join("cwd")).unwrap(),
        PathBuf::from("/")
    );

    // Standard streams discarded.
    for fd in 0..3 {
        assert_eq!(
            fs::read_link(proc_dir.join("fd").join(fd.to_string())).unwrap(),
            PathBuf::from("/dev/null")
        );
    }

    // Nothing else open but the held lock and, when the system log was
    // reachable, the syslog socket.
    for entry in fs::read_dir(proc_dir.join("fd")).unwrap() {
        let entry = entry.unwrap();
        let fd: i32 = entry.file_name().to_str().unwrap().parse().unwrap();
        if fd <= 2 {
            continue;
        }
        let target = fs::read_link(entry.path()).unwrap();
        let named = target.to_string_lossy();
        assert!(
            target.file_name() == scratch.lockfile.file_name() || named.starts_with("socket:"),
            "unexpected descriptor {fd} -> {named}"
        );
    }

    // Member of the dead session leader's session, not leading it, with no
    // controlling terminal.
    let stat = fs::read_to_string(proc_dir.join("stat")).unwrap();
    let after_comm = stat.rsplit(')').next().unwrap();
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let pgrp: i32 = fields[2].parse().unwrap();
    let session: i32 = fields[3].parse().unwrap();
    let tty: i32 = fields[4].parse().unwrap();
    assert_ne!(session, pid, "daemon must not lead its session");
    assert_eq!(pgrp, session);
    assert_eq!(tty, 0, "daemon must have no controlling terminal");

    terminate(pid);
    assert!(wait_until_gone(pid, Duration::from_secs(3)));
    reaper.disarm();
}

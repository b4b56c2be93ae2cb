use std::path::PathBuf;
use std::process::{self, ExitCode};
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use syslog::{BasicLogger, Facility, Formatter3164};

use daemon_smith::{ProcessIdentity, Role, Shutdown, SmithDaemon, run_loop};

/// Demonstration daemon: detaches, then heartbeats into syslog until told
/// to stop.
#[derive(Debug, Parser)]
#[command(name = "smithd", version, about)]
struct Args {
    /// Detach from the terminal and run in the background.
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Single-instance lock file path.
    #[arg(short = 'l', long, value_name = "FILE")]
    lockfile: Option<PathBuf>,

    /// PID file path.
    #[arg(short = 'p', long, value_name = "FILE")]
    pidfile: Option<PathBuf>,

    /// Run as this user after detaching.
    #[arg(short = 'u', long, value_name = "NAME")]
    user: Option<String>,

    /// Seconds between heartbeats.
    #[arg(short = 'i', long, value_name = "SECS", default_value_t = 30)]
    interval: u64,
}

fn main() -> ExitCode {
    let Args {
        daemon: daemonize,
        lockfile,
        pidfile,
        user,
        interval,
    } = Args::parse();

    if daemonize {
        let mut config = SmithDaemon::new().name("smithd");
        if let Some(path) = lockfile {
            config = config.lock_file(path);
        }
        if let Some(path) = pidfile {
            config = config.pid_file(path);
        }
        if let Some(name) = user {
            config = config.user(name);
        }
        match config.start() {
            Ok(Role::Launcher) => return ExitCode::SUCCESS,
            Ok(Role::Daemon) => {}
            Err(err) => {
                eprintln!("smithd: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    // In the detached case the syslog socket must be opened only now, after
    // descriptor sanitization.
    init_syslog();
    serve(Duration::from_secs(interval))
}

fn serve(interval: Duration) -> ExitCode {
    let shutdown = match Shutdown::install() {
        Ok(shutdown) => shutdown,
        Err(err) => {
            log::error!("cannot install signal handlers: {err}");
            eprintln!("smithd: cannot install signal handlers: {err}");
            return ExitCode::FAILURE;
        }
    };

    say(&format!("started: {}", ProcessIdentity::current()));
    let mut beat = 0u64;
    run_loop(&shutdown, interval, |state| {
        if state.take_reload_request() {
            say("reload requested, nothing to reload");
        }
        beat += 1;
        say(if beat % 2 == 1 { "tick" } else { "tock" });
    });
    say("stopping");
    ExitCode::SUCCESS
}

/// Heartbeats go to syslog and, when attached, to the terminal.
fn say(message: &str) {
    log::info!("{message}");
    println!("{message}");
}

/// Routes the log facade to the system log. A failure leaves the facade
/// no-op, which a heartbeat demo can live with.
fn init_syslog() {
    let formatter = Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "smithd".into(),
        pid: process::id(),
    };
    if let Ok(logger) = syslog::unix(formatter) {
        if log::set_boxed_logger(Box::new(BasicLogger::new(logger))).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
    }
}

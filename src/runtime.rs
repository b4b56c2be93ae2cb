use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::DaemonResult;

/// Signal-driven shutdown and reload state for the steady-state loop.
///
/// `SIGTERM` and `SIGINT` latch the stop flag; `SIGHUP` latches a reload
/// request that the loop body may consume or ignore. The handlers only set
/// atomic flags, so arbitrary interruption points are safe.
pub struct Shutdown {
    stop: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl Shutdown {
    /// Registers the flag handlers for `SIGTERM`, `SIGINT` and `SIGHUP`.
    pub fn install() -> DaemonResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let reload = Arc::new(AtomicBool::new(false));
        for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
            signal_hook::flag::register(signal, Arc::clone(&stop))?;
        }
        signal_hook::flag::register(signal_hook::consts::SIGHUP, Arc::clone(&reload))?;
        Ok(Shutdown { stop, reload })
    }

    /// True until a stop signal arrives.
    pub fn should_run(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    /// Reports and clears a pending reload request.
    pub fn take_reload_request(&self) -> bool {
        self.reload.swap(false, Ordering::Relaxed)
    }

    /// Requests shutdown from ordinary code, as if a stop signal arrived.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Runs `tick` once per iteration until a stop signal arrives, sleeping
/// `interval` between iterations.
///
/// The stop flag is polled once per iteration, so shutdown latency is
/// bounded by one interval plus the tick's own runtime. Final logging and
/// the process exit status stay with the caller.
pub fn run_loop<F>(shutdown: &Shutdown, interval: Duration, mut tick: F)
where
    F: FnMut(&Shutdown),
{
    while shutdown.should_run() {
        tick(shutdown);
        if !shutdown.should_run() {
            break;
        }
        thread::sleep(interval);
    }
    debug!("stop signal observed, leaving the run loop");
}

//! Fork-based worker pool supervisor.
//!
//! The supervisor forks workers up to the pool size, reaps them as they exit
//! and forwards stop requests to every live worker. Signal handlers only
//! record what arrived; the run loops do the actual work
//! on the main loop, so the [`ChildSet`] and [`Lifecycle`] are only ever
//! touched from ordinary control flow.
use std::{
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    process,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::{
        signal::{self, Signal},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::{ForkResult, Pid, fork, getpid},
};
use tracing::{debug, error, info, warn};

use crate::{
    backoff::{ONE_SHOT_ATTEMPTS, SpawnBackoff},
    children::ChildSet,
    config::PoolOptions,
    error::PoolError,
    pacer::Pacer,
    signals::{self, SignalGuard},
    work::WorkUnit,
};

/// Pacing interval of both run loops.
const TICK: Duration = Duration::from_secs(1);
/// Poll interval while waiting for workers to exit after a stop.
const DRAIN_POLL: Duration = Duration::from_millis(100);
/// Exit status of a worker whose work unit panicked.
pub const PANIC_STATUS: i32 = 101;

/// Supervisor lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Spawning and (in continuous mode) respawning workers.
    Running,
    /// A stop was requested; no further forks.
    Stopping,
    /// The run call has returned. The supervisor cannot be run again.
    Stopped,
}

impl Lifecycle {
    pub fn is_running(self) -> bool {
        self == Lifecycle::Running
    }

    /// Moves `Running` to `Stopping`. Returns `true` only for the first request.
    fn begin_stop(&mut self) -> bool {
        if *self == Lifecycle::Running {
            *self = Lifecycle::Stopping;
            true
        } else {
            false
        }
    }
}

/// A signal that ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    /// Console break (`SIGINT`).
    Interrupt,
    /// Termination request (`SIGTERM`).
    Terminate,
    /// Execution ceiling elapsed (`SIGALRM`).
    Alarm,
}

impl StopTrigger {
    pub const ALL: [StopTrigger; 3] = [
        StopTrigger::Interrupt,
        StopTrigger::Terminate,
        StopTrigger::Alarm,
    ];

    /// Signal that raises this trigger.
    pub fn signal(self) -> Signal {
        match self {
            StopTrigger::Interrupt => Signal::SIGINT,
            StopTrigger::Terminate => Signal::SIGTERM,
            StopTrigger::Alarm => Signal::SIGALRM,
        }
    }

    /// Signal forwarded to every live worker.
    pub fn forwarded(self) -> Signal {
        match self {
            StopTrigger::Interrupt => Signal::SIGINT,
            StopTrigger::Terminate | StopTrigger::Alarm => Signal::SIGTERM,
        }
    }

    /// Whether handling this trigger disarms the execution ceiling.
    fn cancels_alarm(self) -> bool {
        !matches!(self, StopTrigger::Alarm)
    }
}

/// Keeps a pool of forked workers, each running the same [`WorkUnit`].
///
/// Forking requires the parent to be single-threaded; construct and run the
/// supervisor before starting any threads.
pub struct Supervisor<W: WorkUnit> {
    work: W,
    pool_size: usize,
    options: PoolOptions,
    children: ChildSet,
    lifecycle: Lifecycle,
    pacer: Pacer,
    backoff: SpawnBackoff,
    _signals: SignalGuard,
}

impl<W: WorkUnit> Supervisor<W> {
    /// Installs the signal handlers and, when enabled, arms the execution ceiling.
    pub fn new(work: W, pool_size: usize, options: PoolOptions) -> Result<Self, PoolError> {
        let mut observed = vec![Signal::SIGINT, Signal::SIGCHLD, Signal::SIGTERM];
        if options.ceiling().is_some() {
            observed.push(Signal::SIGALRM);
        }
        let guard = SignalGuard::install(&observed)?;

        if let Some(secs) = options.ceiling() {
            if options.debug {
                info!("All workers must finish within {secs} seconds");
            }
            signals::arm_alarm(secs);
        }

        Ok(Self {
            work,
            pool_size,
            options,
            children: ChildSet::new(),
            lifecycle: Lifecycle::Running,
            pacer: Pacer::new(),
            backoff: SpawnBackoff::new(),
            _signals: guard,
        })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn children(&self) -> &ChildSet {
        &self.children
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Keeps `pool_size` workers alive until a stop signal arrives.
    pub fn run_forever(&mut self) -> Result<(), PoolError> {
        self.ensure_runnable()?;

        while self.lifecycle.is_running() {
            self.dispatch_signals();
            if !self.lifecycle.is_running() {
                break;
            }

            if self.pacer.is_owed() {
                self.pacer.resume();
                continue;
            }

            let deficit = self.children.deficit(self.pool_size);
            if deficit > 0 && self.backoff.ready(Instant::now()) {
                self.spawn(deficit);
            }

            self.pacer.sleep(TICK);
        }

        self.drain();
        self.finish();
        Ok(())
    }

    /// Forks `pool_size` workers once and waits until they have all exited
    /// or a stop signal arrives.
    pub fn run_once(&mut self) -> Result<(), PoolError> {
        self.ensure_runnable()?;

        let forked = self.spawn(self.pool_size);
        let mut outstanding = self.pool_size - forked;

        while self.lifecycle.is_running() {
            self.dispatch_signals();
            if !self.lifecycle.is_running() {
                break;
            }

            if outstanding > 0 && self.backoff.exhausted(ONE_SHOT_ATTEMPTS) {
                error!(
                    "Giving up on {outstanding} worker(s) after {} failed forks",
                    self.backoff.failures()
                );
                outstanding = 0;
            }

            if outstanding == 0 && self.children.is_empty() {
                break;
            }

            if self.pacer.is_owed() {
                self.pacer.resume();
                continue;
            }

            if outstanding > 0 && self.backoff.ready(Instant::now()) {
                outstanding -= self.spawn(outstanding);
            }

            self.pacer.sleep(TICK);
        }

        self.drain();
        self.finish();
        Ok(())
    }

    fn ensure_runnable(&self) -> Result<(), PoolError> {
        match self.lifecycle {
            Lifecycle::Running => Ok(()),
            Lifecycle::Stopping | Lifecycle::Stopped => Err(PoolError::NotRestartable),
        }
    }

    /// Forks up to `want` workers and returns how many were started.
    ///
    /// `left` is local to the call: workers reaped between forks do not
    /// change how many this pass creates.
    fn spawn(&mut self, want: usize) -> usize {
        let mut left = want;

        while left > 0 {
            match self.fork_worker() {
                Ok(pid) => {
                    self.children.insert(pid);
                    self.backoff.reset();
                    left -= 1;
                }
                Err(err) => {
                    let delay = self.backoff.record_failure(Instant::now());
                    warn!("Failed to fork worker: {err}; retrying in {delay:?}");
                    break;
                }
            }
        }

        want - left
    }

    fn fork_worker(&mut self) -> Result<Pid, Errno> {
        // SAFETY: the supervisor runs single-threaded, and the child only runs
        // the work unit before exiting.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => {
                debug!("Forked worker #{child}");
                Ok(child)
            }
            ForkResult::Child => enter_worker(&mut self.work, self.options.debug),
        }
    }

    /// Handles every signal recorded since the previous call.
    ///
    /// Stop triggers are processed before reaping.
    fn dispatch_signals(&mut self) {
        let pending = signals::take_pending();
        if pending.is_empty() {
            return;
        }

        for trigger in StopTrigger::ALL {
            if pending.contains(trigger.signal()) {
                self.log_intercepted(trigger.signal());
                self.stop(trigger);
            }
        }

        if pending.contains(Signal::SIGCHLD) {
            self.log_intercepted(Signal::SIGCHLD);
            self.reap();
        }
    }

    fn log_intercepted(&self, sig: Signal) {
        if self.options.debug {
            info!("Supervisor {} intercepted {}", getpid(), sig.as_str());
        }
    }

    fn stop(&mut self, trigger: StopTrigger) {
        if trigger.cancels_alarm() {
            signals::cancel_alarm();
        }
        if self.lifecycle.begin_stop() {
            debug!("Supervisor stopping after {trigger:?}");
        }
        self.forward(trigger.forwarded());
    }

    /// Sends `sig` to every tracked worker in fork order.
    fn forward(&self, sig: Signal) {
        for pid in self.children.iter() {
            match signal::kill(pid, sig) {
                Ok(()) => debug!("Sent {} to worker #{pid}", sig.as_str()),
                Err(Errno::ESRCH) => debug!("Worker #{pid} already gone"),
                Err(err) => warn!("Failed to send {} to worker #{pid}: {err}", sig.as_str()),
            }
        }
    }

    /// Collects every exited worker without blocking.
    fn reap(&mut self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => self.record_exit(status),
                Err(Errno::EINTR) => continue,
                Err(_) => break,
            }
        }
    }

    fn record_exit(&mut self, status: WaitStatus) {
        let pid = match status {
            WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, _, _) => pid,
            other => {
                debug!("Ignoring wait status {other:?}");
                return;
            }
        };

        if !self.children.remove(pid) {
            debug!("Reaped untracked process #{pid}");
            return;
        }

        if self.options.debug {
            match status {
                WaitStatus::Signaled(_, sig, _) => {
                    info!(pid = %pid, signal = ?sig, "Worker finished")
                }
                WaitStatus::Exited(_, code) => info!(pid = %pid, code, "Worker finished"),
                _ => {}
            }
        }
    }

    /// Waits for workers to exit after a stop, escalating to `SIGKILL`
    /// once the grace period runs out.
    fn drain(&mut self) {
        self.pacer.clear();
        if self.children.is_empty() {
            return;
        }

        let Some(grace) = self.options.grace() else {
            debug!(
                "Leaving {} worker(s) running; shutdown grace disabled",
                self.children.len()
            );
            return;
        };

        let deadline = Instant::now() + grace;
        loop {
            self.dispatch_signals();
            if self.children.is_empty() {
                return;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.pacer.sleep(DRAIN_POLL.min(deadline - now));
        }
        self.pacer.clear();

        warn!(
            "{} worker(s) still running after {grace:?}; sending SIGKILL",
            self.children.len()
        );
        self.forward(Signal::SIGKILL);

        let survivors: Vec<Pid> = self.children.iter().collect();
        for pid in survivors {
            self.wait_for(pid);
        }
    }

    /// Blocks until `pid` has been reaped.
    fn wait_for(&mut self, pid: Pid) {
        loop {
            match waitpid(pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    self.record_exit(status);
                    return;
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(err) => {
                    warn!("Failed to reap worker #{pid}: {err}");
                    self.children.remove(pid);
                    return;
                }
            }
        }
    }

    fn finish(&mut self) {
        self.lifecycle = Lifecycle::Stopped;
        if self.options.debug {
            info!("Supervisor {} is finished", getpid());
        }
    }
}

impl<W: WorkUnit> Drop for Supervisor<W> {
    fn drop(&mut self) {
        if self.options.ceiling().is_some() {
            signals::cancel_alarm();
        }
    }
}

/// Entry point of a freshly forked worker. Never returns into the supervisor.
fn enter_worker<W: WorkUnit>(work: &mut W, debug: bool) -> ! {
    signals::reset_in_child();
    if debug {
        info!("Worker #{} is started", getpid());
    }

    let status = panic::catch_unwind(AssertUnwindSafe(|| work.run())).unwrap_or_else(|_| {
        error!("Worker #{} panicked", getpid());
        PANIC_STATUS
    });

    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    process::exit(status)
}

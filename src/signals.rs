//! Process-wide signal plumbing.
//!
//! Handlers only set a bit in a process-global mask; everything else (reaping,
//! forwarding, logging) happens on the supervisor loop after
//! [`take_pending`] hands the bits over.
use std::{
    ptr,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal},
    unistd::alarm,
};

use crate::error::PoolError;

/// Signals the supervisor reacts to.
pub const OBSERVED: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGALRM,
];

static PENDING: AtomicU32 = AtomicU32::new(0);
static OWNED: AtomicBool = AtomicBool::new(false);

fn bit(signo: libc::c_int) -> u32 {
    if (0..32).contains(&signo) {
        1 << signo
    } else {
        0
    }
}

extern "C" fn record_signal(signo: libc::c_int) {
    PENDING.fetch_or(bit(signo), Ordering::SeqCst);
}

/// Snapshot of signals delivered since the previous [`take_pending`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingSignals(u32);

impl PendingSignals {
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, sig: Signal) -> bool {
        self.0 & bit(sig as libc::c_int) != 0
    }

    /// Returns a copy with `sig` marked as delivered.
    pub fn with(self, sig: Signal) -> Self {
        Self(self.0 | bit(sig as libc::c_int))
    }
}

/// Atomically takes and clears every pending signal.
pub fn take_pending() -> PendingSignals {
    PendingSignals(PENDING.swap(0, Ordering::SeqCst))
}

/// Whether a signal arrived that has not been taken yet.
pub fn has_pending() -> bool {
    PENDING.load(Ordering::SeqCst) != 0
}

/// Sleeps for `duration` unless an observed signal is pending or arrives.
///
/// The observed signals stay blocked between the latch check and the sleep,
/// and `pselect` unblocks them atomically, so a signal delivered in that
/// window still wakes the sleep. Returns the unslept part on interruption.
pub fn sleep_unless_pending(duration: Duration) -> Result<(), Duration> {
    let mut observed = SigSet::empty();
    for sig in OBSERVED {
        observed.add(sig);
    }
    let mut previous = SigSet::empty();
    if signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&observed), Some(&mut previous))
        .is_err()
    {
        return Err(duration);
    }

    if has_pending() {
        restore_mask(&previous);
        return Err(duration);
    }

    let timeout = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    let start = Instant::now();
    // SAFETY: no descriptor sets are passed; `timeout` and `previous` outlive the call.
    let rc = unsafe {
        libc::pselect(
            0,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            &timeout,
            previous.as_ref(),
        )
    };
    let errno = Errno::last();
    restore_mask(&previous);

    match (rc, errno) {
        (-1, Errno::EINTR) => Err(duration.saturating_sub(start.elapsed())),
        _ => Ok(()),
    }
}

fn restore_mask(previous: &SigSet) {
    let _ = signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(previous), None);
}

/// Owns the supervisor's signal dispositions and restores the previous ones on drop.
pub struct SignalGuard {
    previous: Vec<(Signal, SigAction)>,
}

impl SignalGuard {
    /// Installs the recording handler for `signals`.
    ///
    /// Only one guard may exist per process; a second install fails with
    /// [`PoolError::HandlersInUse`] until the first is dropped.
    pub fn install(signals: &[Signal]) -> Result<Self, PoolError> {
        if OWNED.swap(true, Ordering::SeqCst) {
            return Err(PoolError::HandlersInUse);
        }
        PENDING.store(0, Ordering::SeqCst);

        let mut guard = Self {
            previous: Vec::with_capacity(signals.len()),
        };

        for &sig in signals {
            let flags = if sig == Signal::SIGCHLD {
                SaFlags::SA_NOCLDSTOP
            } else {
                SaFlags::empty()
            };
            let action =
                SigAction::new(SigHandler::Handler(record_signal), flags, SigSet::empty());

            // SAFETY: the handler only performs an atomic fetch_or.
            let old = unsafe { signal::sigaction(sig, &action) }
                .map_err(|source| PoolError::SignalInstall { signal: sig, source })?;
            guard.previous.push((sig, old));
        }

        Ok(guard)
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for (sig, action) in self.previous.drain(..).rev() {
            // SAFETY: restoring a disposition that was installed before ours.
            let _ = unsafe { signal::sigaction(sig, &action) };
        }
        OWNED.store(false, Ordering::SeqCst);
    }
}

/// Restores default dispositions in a freshly forked worker.
pub fn reset_in_child() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in OBSERVED {
        // SAFETY: SIG_DFL carries no handler code.
        let _ = unsafe { signal::sigaction(sig, &default) };
    }
    PENDING.store(0, Ordering::SeqCst);
}

/// Arms the one-shot execution ceiling, replacing any earlier alarm.
pub fn arm_alarm(secs: u32) {
    alarm::set(secs);
}

/// Cancels a pending execution ceiling.
pub fn cancel_alarm() {
    alarm::cancel();
}

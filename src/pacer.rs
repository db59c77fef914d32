//! Interruptible pacing sleeps.
//!
//! A signal cuts a sleep short so the supervisor can react right away, but the
//! unslept remainder is kept and must be consumed before the next spawn
//! decision. Frequent child exits therefore cannot speed up the respawn
//! cadence.
use std::time::Duration;

use crate::signals;

/// Outcome of a single sleep attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sleep {
    /// The whole interval elapsed.
    Elapsed,
    /// A signal arrived first; the remainder is now owed.
    Interrupted,
}

/// Tracks the portion of a pacing interval that has not been slept yet.
#[derive(Debug, Default)]
pub struct Pacer {
    owed: Duration,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remainder left over from an interrupted sleep.
    pub fn owed(&self) -> Duration {
        self.owed
    }

    pub fn is_owed(&self) -> bool {
        !self.owed.is_zero()
    }

    /// Drops any remainder, e.g. once the supervisor stops pacing.
    pub fn clear(&mut self) {
        self.owed = Duration::ZERO;
    }

    /// Sleeps a fresh interval, replacing any remainder.
    pub fn sleep(&mut self, interval: Duration) -> Sleep {
        self.owed = interval;
        self.resume()
    }

    /// Sleeps the owed remainder.
    ///
    /// A signal that is already pending keeps the full remainder owed
    /// without sleeping, so it can be dispatched first.
    pub fn resume(&mut self) -> Sleep {
        if self.owed.is_zero() {
            return Sleep::Elapsed;
        }

        match signals::sleep_unless_pending(self.owed) {
            Ok(()) => {
                self.owed = Duration::ZERO;
                Sleep::Elapsed
            }
            Err(remaining) => {
                self.owed = remaining;
                if remaining.is_zero() {
                    Sleep::Elapsed
                } else {
                    Sleep::Interrupted
                }
            }
        }
    }
}

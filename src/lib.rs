//! Forkpool is a small process-pool supervisor for Unix-like systems. It forks a
//! fixed number of workers that each run the same unit of work, keeps the pool
//! topped up (or runs a single batch), enforces an optional wall-clock ceiling and
//! forwards termination requests to every worker on shutdown.

/// Fork-failure retry pacing.
pub mod backoff;

/// Live worker bookkeeping.
pub mod children;

/// Command-line interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Error handling.
pub mod error;

/// Interruptible pacing sleeps.
pub mod pacer;

/// Signal handler installation and the pending-signal latch.
pub mod signals;

/// Worker pool supervisor.
pub mod supervisor;

/// Units of work run inside workers.
pub mod work;


pub use config::{PoolConfig, PoolOptions, RunMode};
pub use error::PoolError;
pub use supervisor::{Lifecycle, Supervisor};
pub use work::{CommandTask, TaskFn, WorkUnit};

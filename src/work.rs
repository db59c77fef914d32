//! Units of work executed inside forked workers.
//!
//! A [`WorkUnit`] is invoked in the child right after `fork`. Its [`WorkUnit::run`]
//! drives the `setup -> execute -> teardown` sequence and yields the status the
//! worker process exits with. The supervisor never interprets that status.

use std::{collections::HashMap, io, os::unix::process::CommandExt, process::Command};

use tracing::error;

/// Exit status used when a command cannot be executed.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Capability to run one unit of work and report an exit status.
pub trait WorkUnit {
    /// Child-local initialization, e.g. reopening resources unsafe to share across fork.
    fn setup(&mut self) {}

    /// Performs the actual work. Failures must be folded into the returned status.
    fn execute(&mut self) -> i32;

    /// Runs after `execute` regardless of the status it returned.
    fn teardown(&mut self) {}

    /// Runs the full lifecycle and returns the worker's exit status.
    fn run(&mut self) -> i32 {
        self.setup();
        let status = self.execute();
        self.teardown();
        status
    }
}

/// Closure-backed work unit with default no-op hooks.
#[derive(Debug)]
pub struct TaskFn<F> {
    f: F,
}

impl<F> TaskFn<F>
where
    F: FnMut() -> i32,
{
    /// Wraps a closure returning the exit status.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> WorkUnit for TaskFn<F>
where
    F: FnMut() -> i32,
{
    fn execute(&mut self) -> i32 {
        (self.f)()
    }
}

/// Runs a shell command by replacing the worker's process image.
///
/// Because the command takes over the worker pid, signals forwarded by the
/// supervisor reach it directly. `teardown` therefore only runs when `exec`
/// fails, in which case the worker exits with [`EXEC_FAILURE_STATUS`].
#[derive(Debug, Clone)]
pub struct CommandTask {
    command: String,
    env: HashMap<String, String>,
}

impl CommandTask {
    /// Creates a task running `sh -c <command>`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
        }
    }

    /// Adds environment variables applied to the command.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// The shell command string.
    pub fn command(&self) -> &str {
        &self.command
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.command).envs(&self.env);
        cmd
    }
}

impl WorkUnit for CommandTask {
    fn execute(&mut self) -> i32 {
        let err: io::Error = self.build().exec();
        error!("Failed to exec '{}': {err}", self.command);
        EXEC_FAILURE_STATUS
    }
}

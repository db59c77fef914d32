//! Command-line interface for forkpool.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{PoolConfig, RunMode, load_config},
    error::PoolError,
};

/// Command-line interface for forkpool.
#[derive(Parser)]
#[command(name = "forkpool", version, author)]
#[command(about = "Keeps a pool of forked workers running a shell command", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity (`off`, `error`, ... `trace`, or 0-5).
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LevelFilter>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for forkpool.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker pool until it stops.
    Run(PoolArgs),

    /// Print the resolved pool settings without forking anything.
    Check(PoolArgs),
}

/// Pool settings. Flags override values from the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PoolArgs {
    /// Path to a YAML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of workers to keep alive.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Run mode: `forever` or `once`.
    #[arg(short, long)]
    pub mode: Option<RunMode>,

    /// Stop everything after this many seconds (0 disables the ceiling).
    #[arg(long, value_name = "SECONDS")]
    pub max_execution_time: Option<u32>,

    /// Seconds to wait for workers after a stop before killing them (0 disables).
    #[arg(long, value_name = "SECONDS")]
    pub shutdown_grace: Option<u32>,

    /// Log worker lifecycle and intercepted signals.
    #[arg(long)]
    pub debug: bool,

    /// Shell command each worker runs.
    #[arg(long, value_name = "CMD")]
    pub command: Option<String>,
}

impl PoolArgs {
    /// Loads the config file (if any) and applies the flag overrides.
    pub fn resolve(&self) -> Result<PoolConfig, PoolError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => PoolConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut PoolConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(secs) = self.max_execution_time {
            config.options.max_execution_time = secs;
        }
        if let Some(secs) = self.shutdown_grace {
            config.options.shutdown_grace = secs;
        }
        if self.debug {
            config.options.debug = true;
        }
        if let Some(command) = &self.command {
            config.command = Some(command.clone());
        }
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}

use std::{error::Error, io::IsTerminal};

use tracing::info;
use tracing_subscriber::EnvFilter;

use forkpool::{
    CommandTask, PoolConfig, PoolError, RunMode, Supervisor,
    cli::{Cli, Commands, parse_args},
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    match &args.command {
        Commands::Run(pool) => {
            let config = pool.resolve()?;
            run_pool(config)?;
        }
        Commands::Check(pool) => {
            let config = pool.resolve()?;
            print_summary(&config)?;
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

fn run_pool(config: PoolConfig) -> Result<(), PoolError> {
    let command = config.command.clone().ok_or(PoolError::MissingCommand)?;
    let task = CommandTask::new(command).with_env(config.env.clone().unwrap_or_default());

    info!(
        "Starting {} worker(s) in {} mode: {}",
        config.workers,
        config.mode.as_ref(),
        task.command()
    );

    let mut supervisor = Supervisor::new(task, config.workers, config.options)?;
    match config.mode {
        RunMode::Forever => supervisor.run_forever(),
        RunMode::Once => supervisor.run_once(),
    }
}

fn print_summary(config: &PoolConfig) -> Result<(), PoolError> {
    let command = config.command.as_deref().ok_or(PoolError::MissingCommand)?;
    let options = &config.options;

    println!("workers: {}", config.workers);
    println!("mode: {}", config.mode.as_ref());
    println!("command: {command}");
    println!("max_execution_time: {}", options.max_execution_time);
    println!("shutdown_grace: {}", options.shutdown_grace);
    println!("debug: {}", options.debug);
    if let Some(env) = &config.env {
        let mut keys: Vec<_> = env.keys().collect();
        keys.sort();
        for key in keys {
            println!("env: {key}");
        }
    }

    Ok(())
}

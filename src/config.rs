//! Configuration management for forkpool.
use regex::Regex;
use serde::Deserialize;
use std::{collections::HashMap, env, fs, path::Path, time::Duration};
use strum_macros::{AsRefStr, EnumString};

use crate::error::PoolError;

/// Options recognised by the supervisor. Immutable once the supervisor is built.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolOptions {
    /// Global wall-clock ceiling in seconds, measured from construction. `0` disables it.
    pub max_execution_time: u32,
    /// Emit lifecycle diagnostics (worker start/finish, intercepted signals).
    pub debug: bool,
    /// Seconds to wait for children after a stop before sending `SIGKILL`.
    /// `0` returns immediately without waiting.
    pub shutdown_grace: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_execution_time: 60,
            debug: false,
            shutdown_grace: 5,
        }
    }
}

impl PoolOptions {
    /// Returns the execution ceiling, or `None` when disabled.
    pub fn ceiling(&self) -> Option<u32> {
        (self.max_execution_time > 0).then_some(self.max_execution_time)
    }

    /// Returns the shutdown drain window, or `None` when disabled.
    pub fn grace(&self) -> Option<Duration> {
        (self.shutdown_grace > 0).then(|| Duration::from_secs(self.shutdown_grace.into()))
    }
}

/// Which run entry point the hosting program calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunMode {
    /// Keep the pool full until a stop signal arrives.
    #[default]
    Forever,
    /// Fork one batch and wait for it to drain.
    Once,
}

/// Represents the structure of the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Number of workers kept alive.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Run mode.
    #[serde(default)]
    pub mode: RunMode,
    /// Shell command each worker executes.
    pub command: Option<String>,
    /// Extra environment variables for the workers.
    pub env: Option<HashMap<String, String>>,
    /// Supervisor options.
    #[serde(default)]
    pub options: PoolOptions,
}

fn default_workers() -> usize {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            mode: RunMode::default(),
            command: None,
            env: None,
            options: PoolOptions::default(),
        }
    }
}

/// Expands `${VAR}` references within a string. Bare `$VAR` is left alone.
fn expand_env_vars(input: &str) -> Result<String, PoolError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;

    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(PoolError::MissingEnvVar(var_name)),
        None => Ok(result.into_owned()),
    }
}

/// Parses configuration from YAML text.
///
/// `env` values are expanded from the supervisor's environment. The worker
/// `command` is kept verbatim so its variables are resolved by the worker's
/// shell, after the `env` map has been applied.
pub fn parse_config(content: &str) -> Result<PoolConfig, PoolError> {
    let mut config: PoolConfig = serde_yaml::from_str(content)?;
    if let Some(env) = config.env.as_mut() {
        for value in env.values_mut() {
            *value = expand_env_vars(value)?;
        }
    }
    Ok(config)
}

/// Loads and parses the configuration file.
pub fn load_config(config_path: &Path) -> Result<PoolConfig, PoolError> {
    let content = fs::read_to_string(config_path).map_err(|e| {
        PoolError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    parse_config(&content)
}

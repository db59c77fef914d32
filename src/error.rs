//! Error handling for forkpool.
use nix::sys::signal::Signal;
use thiserror::Error;

/// Defines all errors surfaced by the supervisor and its configuration layer.
///
/// Fork failures and reap anomalies are logged by the supervisor, not returned.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Registering a signal handler failed; the shutdown protocol cannot work without it.
    #[error("Failed to install handler for {signal:?}: {source}")]
    SignalInstall {
        /// Signal whose handler could not be registered.
        signal: Signal,
        /// The underlying error that occurred.
        #[source]
        source: nix::errno::Errno,
    },

    /// Another supervisor in this process already owns the signal handlers.
    #[error("Signal handlers are already owned by a running supervisor")]
    HandlersInUse,

    /// A run mode was invoked after the supervisor reached `Stopped`.
    #[error("Supervisor has already stopped and cannot be run again")]
    NotRestartable,

    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// The environment expansion pattern failed to compile.
    #[error("Invalid expansion pattern: {0}")]
    PatternError(#[from] regex::Error),

    /// The configuration references an environment variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Neither the config file nor the command line named a command.
    #[error("No command configured for the workers")]
    MissingCommand,
}

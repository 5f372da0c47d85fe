//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::recorder::RecorderError;

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating the configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The message recorder could not be set up.
    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    /// The runtime was already running.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

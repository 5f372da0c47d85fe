//! Configuration module for the amber runtime.
//!
//! Layered loading through figment, the configuration schema, and
//! validation of loaded values.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AmberConfig, BotConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, RecorderConfig,
    SpanEventConfig,
};
pub use validation::validate_config;

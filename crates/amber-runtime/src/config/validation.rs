//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AmberConfig, BotConfig, LogOutput, LoggingConfig, RecorderConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &AmberConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bot_config(&config.bot)?;
    validate_recorder_config(&config.recorder)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter module names cannot be empty"));
    }

    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.prefix_keywords.iter().any(|word| word.is_empty()) {
        return Err(ConfigError::validation(
            "Prefix keywords cannot be empty strings",
        ));
    }
    Ok(())
}

fn validate_recorder_config(recorder: &RecorderConfig) -> ConfigResult<()> {
    if !recorder.enabled {
        return Ok(());
    }

    if recorder.interval_secs == 0 {
        return Err(ConfigError::validation(
            "Recorder interval must be greater than 0",
        ));
    }

    if recorder.database.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("recorder.database"));
    }

    Ok(())
}

//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CredentialsConfig, LogOutput, LoggingConfig, ParleyConfig, StreamingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    if config.app.name.trim().is_empty() {
        return Err(ConfigError::validation("app.name must not be empty"));
    }
    validate_streaming_config(&config.streaming)?;
    validate_credentials_config(&config.credentials)?;
    validate_logging_config(&config.logging)?;

    for (name, section) in &config.plugins {
        if !section.is_object() {
            return Err(ConfigError::validation(format!(
                "plugins.{name} must be a table"
            )));
        }
    }
    Ok(())
}

fn validate_streaming_config(streaming: &StreamingConfig) -> ConfigResult<()> {
    for (field, value) in [
        ("debounce_ms", streaming.debounce_ms),
        ("interval_ms", streaming.interval_ms),
        ("close_poll_ms", streaming.close_poll_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::validation(format!(
                "streaming.{field} must be greater than 0"
            )));
        }
    }

    if streaming.batch_divisor == 0 {
        return Err(ConfigError::validation(
            "streaming.batch_divisor must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_credentials_config(credentials: &CredentialsConfig) -> ConfigResult<()> {
    if credentials.cache_capacity == 0 {
        return Err(ConfigError::validation(
            "credentials.cache_capacity must be greater than 0",
        ));
    }
    if credentials.ttl_secs == 0 {
        return Err(ConfigError::validation(
            "credentials.ttl_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    let valid_levels = super::schema::LogLevel::NAMES;
    for (target, level) in &logging.filters {
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(format!(
                "Invalid log level for {target}: {level}. Valid values are: {valid_levels:?}"
            )));
        }
    }

    if logging.output == LogOutput::File
        && logging
            .file_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(ConfigError::validation("logging.file_path must not be empty"));
    }

    Ok(())
}

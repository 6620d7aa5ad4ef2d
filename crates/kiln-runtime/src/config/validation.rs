//! Configuration validation utilities.

use std::collections::HashSet;

use tracing::warn;

use super::error::{ConfigError, ConfigResult};
use super::schema::{KilnConfig, LogOutput, LoggingConfig, StartupConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &KilnConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_startup_config(&config.startup)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: {module:?}"
            )));
        }
    }

    Ok(())
}

fn validate_startup_config(startup: &StartupConfig) -> ConfigResult<()> {
    for id in startup.start_plugins.iter().chain(&startup.ignore_plugins) {
        if id.trim().is_empty() {
            return Err(ConfigError::validation("Plugin ids in startup lists cannot be empty"));
        }
    }

    let ignored: HashSet<&str> = startup.ignore_plugins.iter().map(String::as_str).collect();
    for id in &startup.start_plugins {
        if ignored.contains(id.as_str()) {
            warn!(plugin = %id, "Plugin is both started and ignored; it will not start");
        }
    }

    Ok(())
}

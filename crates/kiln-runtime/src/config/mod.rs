//! Configuration module for the kiln runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for logging, the startup sequence and container options.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    KilnConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, PluginsConfig,
    SpanEventConfig, StartupConfig,
};
pub use validation::validate_config;

//! Runtime error types.

use kiln_framework::PluginError;
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while building or driving an [`Application`].
///
/// [`Application`]: crate::Application
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A plugin container operation failed.
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

//! Error types shared by every kiln crate.

use std::sync::Arc;

use thiserror::Error;

/// Error type returned by plugin and command code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A cloneable error cause.
///
/// One activation outcome is observed by every caller waiting on it, so the
/// failure it carries has to be shareable.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Converts a [`BoxError`] into a [`SharedError`].
pub fn share_error(err: BoxError) -> SharedError {
    Arc::from(err)
}

/// Errors raised by the [`CommandRegistry`](crate::command::CommandRegistry).
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// A command with this id is already registered.
    #[error("command '{0}' is already registered")]
    Duplicate(String),

    /// No command with this id is registered.
    #[error("command '{0}' is not registered")]
    NotFound(String),

    /// The command handler returned an error.
    #[error("command '{id}' failed: {cause}")]
    Failed {
        id: String,
        #[source]
        cause: SharedError,
    },
}

/// Result type for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

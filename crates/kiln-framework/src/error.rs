//! Error types for the plugin container.

use std::fmt;

use kiln_core::SharedError;
use thiserror::Error;

/// How a plugin without a teardown function is related to the plugin being
/// deactivated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownRelation {
    /// The plugin is the deactivation target itself.
    Target,
    /// The plugin depends, directly or transitively, on the named target.
    DependsOn(String),
}

impl fmt::Display for TeardownRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target => f.write_str("deactivation target"),
            Self::DependsOn(target) => write!(f, "depends on '{target}'"),
        }
    }
}

/// Errors raised by registration, activation and deactivation.
///
/// `Clone` so that a single activation outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// A plugin with this id is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateId(String),

    /// Registering the plugin would close a dependency cycle.
    #[error("plugin '{id}' would close a dependency cycle: {}", .chain.join(" -> "))]
    CycleDetected { id: String, chain: Vec<String> },

    /// No plugin with this id is registered.
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),

    /// The plugin is activated and removal was not forced.
    #[error("plugin '{0}' is still active")]
    StillActive(String),

    /// A required service has no registered provider.
    #[error("no provider for required service '{token}'")]
    NoProvider { token: String },

    /// A plugin in the deactivation closure has no teardown function.
    #[error("plugin '{id}' has no deactivate function ({relation})")]
    MissingTeardown { id: String, relation: TeardownRelation },

    /// The plugin's own activate function failed.
    #[error("plugin '{id}' failed to activate: {cause}")]
    ActivationFailed {
        id: String,
        #[source]
        cause: SharedError,
    },

    /// One or more teardown functions failed.
    ///
    /// The failing plugins stay activated.
    #[error("{} plugin(s) failed to deactivate: {}", .failures.len(), describe_failures(.failures))]
    TeardownFailed { failures: Vec<(String, SharedError)> },

    /// A service was found but stored under a different type.
    #[error("service '{token}' does not have the requested type")]
    ServiceTypeMismatch { token: String },
}

fn describe_failures(failures: &[(String, SharedError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("'{id}' ({e})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PluginError {
    /// Ids of the plugins whose teardown failed, if this is a
    /// [`TeardownFailed`](Self::TeardownFailed) error.
    pub fn failed_plugins(&self) -> Vec<&str> {
        match self {
            Self::TeardownFailed { failures } => failures.iter().map(|(id, _)| id.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Result type for plugin container operations.
pub type PluginResult<T> = Result<T, PluginError>;

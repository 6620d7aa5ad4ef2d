//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use kiln_framework::{ClosureEdges, ManagerOptions};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// [logging]
/// level = "debug"
/// format = "pretty"
///
/// [startup]
/// start_plugins = ["clock"]
/// ignore_plugins = ["telemetry"]
///
/// [plugins]
/// closure_edges = "required_only"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KilnConfig {
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which plugins the startup sequence activates.
    #[serde(default)]
    pub startup: StartupConfig,

    /// Plugin container options.
    #[serde(default)]
    pub plugins: PluginsConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Global log level.  `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file path, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// How often the log file is rolled over.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids in every event.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in every event.
    #[serde(default)]
    pub file_location: bool,

    /// Which span lifecycle events are logged.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module level overrides, e.g. `kiln_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Span lifecycle events to log.  All off by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

// =============================================================================
// Startup & plugins
// =============================================================================

/// Startup set adjustments applied on top of each plugin's `auto_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StartupConfig {
    /// Plugins activated at startup regardless of their `auto_start`.
    pub start_plugins: Vec<String>,

    /// Plugins never activated at startup.  Wins over everything else.
    pub ignore_plugins: Vec<String>,
}

/// Plugin container options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginsConfig {
    /// Which dependents are torn down together with a deactivated plugin.
    pub closure_edges: ClosureEdges,
}

impl PluginsConfig {
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            closure_edges: self.closure_edges,
        }
    }
}

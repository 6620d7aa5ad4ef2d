//! Kiln Runtime - application shell for the kiln plugin container.
//!
//! This crate provides:
//! - The [`Application`] shell owning one [`PluginManager`]
//! - The startup sequence ([`StartupCoordinator`]) with its one-shot
//!   completion signal and mount callback
//! - Configuration loading and validation (figment)
//! - Logging configuration (tracing-subscriber)
//!
//! ```ignore
//! use kiln_runtime::{Application, StartOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = Application::builder().config_file("kiln.toml").build()?;
//!     app.register_plugins(my_plugins())?;
//!
//!     app.on_mount(|manager| tracing::info!(plugins = ?manager.list_plugins(), "mounted"));
//!     let report = app.start(StartOptions::new()).await;
//!     if !report.is_clean() {
//!         tracing::warn!(failed = report.failed.len(), "Some plugins did not start");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`PluginManager`]: kiln_framework::PluginManager

pub mod application;
pub mod config;
pub mod error;
pub mod logging;
pub mod startup;

// Re-exports
pub use application::{Application, ApplicationBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, KilnConfig, StartupConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use startup::{MountFn, StartOptions, StartupCoordinator, StartupHandle, StartupReport};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros, for plugins that do not depend on `tracing` directly.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

//! # Kiln Framework
//!
//! The plugin container: registration, dependency resolution and lifecycle.
//!
//! This layer provides:
//! - [`PluginDescriptor`] and its builder for declaring plugins
//! - [`PluginManager`], the container that registers, activates and
//!   deactivates plugins
//! - [`ResolvedServices`], the ordered dependency values handed to plugins
//! - [`PluginError`], the error taxonomy of every container operation
//!
//! Configuration, logging and the startup sequence live in `kiln-runtime`.

mod activation;
mod deactivation;
pub mod error;
pub mod manager;
pub mod plugin;

pub use error::{PluginError, PluginResult, TeardownRelation};
pub use manager::{ClosureEdges, ManagerOptions, PluginManager};
pub use plugin::{
    ActivateFn, AutoStart, DeactivateFn, NoService, PluginBuilder, PluginDescriptor,
    ProvidesService, ResolvedServices,
};

//! The plugin container.
//!
//! [`PluginManager`] is the single owner of one application's plugin graph.
//! It:
//!
//! - Accepts [`PluginDescriptor`]s and admits them into the registry after the
//!   cycle guard has checked them.
//! - Activates plugins lazily, resolving their required and optional services
//!   first (see `activation.rs`).  Concurrent requests for the same plugin
//!   share one attempt through the in-flight table.
//! - Deactivates a plugin together with everything that depends on it, in
//!   dependents-first order (see `deactivation.rs`).
//! - Owns the [`CommandRegistry`] handed to plugins through the container
//!   handle.
//!
//! The manager is a cheap handle: clones share the same graph.  It is also the
//! "container" argument every activate and deactivate function receives, so
//! plugins can activate other plugins or resolve services themselves.
//!
//! # Locking
//!
//! All mutable state lives behind one `parking_lot` mutex that is never held
//! across an `.await`.  Every mutation (registration, the moment an activation
//! or teardown settles) is therefore atomic with respect to other tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_framework::{PluginDescriptor, PluginManager};
//!
//! let manager = PluginManager::new();
//! manager.register_plugin(CLOCK_PLUGIN)?;
//! manager.register_plugin(STATUS_BAR_PLUGIN)?;
//!
//! manager.activate_plugin("status-bar").await?;     // activates "clock" first
//! let torn_down = manager.deactivate_plugin("clock").await?;
//! assert_eq!(torn_down, ["status-bar", "clock"]);
//! ```

use std::sync::Arc;

use kiln_core::CommandRegistry;
use parking_lot::{Mutex, MutexGuard};
use tracing::error;

use crate::activation::InflightTable;
use crate::error::PluginResult;
use crate::plugin::registry::Registry;
use crate::plugin::{AutoStart, PluginDescriptor};

// =============================================================================
// Options
// =============================================================================

/// Which dependency edges pull a plugin into a deactivation closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ClosureEdges {
    /// Required and optional dependents are both torn down.
    #[default]
    All,
    /// Only required dependents are torn down.  Optional dependents keep
    /// running with the stale service until they are deactivated themselves.
    RequiredOnly,
}

/// Tunables for a [`PluginManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ManagerOptions {
    pub closure_edges: ClosureEdges,
}

// =============================================================================
// PluginManager
// =============================================================================

pub(crate) struct State {
    pub(crate) registry: Registry,
    pub(crate) inflight: InflightTable,
}

struct Inner {
    state: Mutex<State>,
    commands: Arc<CommandRegistry>,
    options: ManagerOptions,
}

/// Handle to a plugin graph.  See the [module docs](self).
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<Inner>,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self::with_options(ManagerOptions::default())
    }

    pub fn with_options(options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    registry: Registry::new(),
                    inflight: InflightTable::default(),
                }),
                commands: Arc::new(CommandRegistry::new()),
                options,
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock()
    }

    pub fn options(&self) -> ManagerOptions {
        self.inner.options
    }

    /// The command registry shared by every plugin of this container.
    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.inner.commands
    }

    /// Returns `true` if both handles point at the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a plugin.
    ///
    /// Fails with [`DuplicateId`] or [`CycleDetected`]; in both cases the
    /// container is left unchanged.
    ///
    /// [`DuplicateId`]: crate::PluginError::DuplicateId
    /// [`CycleDetected`]: crate::PluginError::CycleDetected
    pub fn register_plugin(&self, plugin: impl Into<PluginDescriptor>) -> PluginResult<()> {
        self.state().registry.register(plugin.into())
    }

    /// Registers plugins in order, stopping at the first failure.
    ///
    /// Plugins before the failing one stay registered.
    pub fn register_plugins<I>(&self, plugins: I) -> PluginResult<()>
    where
        I: IntoIterator,
        I::Item: Into<PluginDescriptor>,
    {
        for plugin in plugins {
            self.register_plugin(plugin)?;
        }
        Ok(())
    }

    /// Removes a plugin.
    ///
    /// A no-op for unknown ids.  Fails with [`StillActive`] if the plugin is
    /// activated and `force` is not set.  Services it provided become
    /// unresolvable; plugins already holding them are not notified.
    ///
    /// [`StillActive`]: crate::PluginError::StillActive
    pub fn unregister_plugin(&self, id: &str, force: bool) -> PluginResult<()> {
        self.state().registry.unregister(id, force).map(|_| ())
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn has_plugin(&self, id: &str) -> bool {
        self.state().registry.has(id)
    }

    pub fn is_plugin_activated(&self, id: &str) -> bool {
        self.state().registry.is_activated(id)
    }

    /// Ids of every registered plugin, sorted.
    pub fn list_plugins(&self) -> Vec<String> {
        self.state().registry.list()
    }

    /// The plugin's description, or an empty string when it has none or is
    /// not registered.
    pub fn plugin_description(&self, id: &str) -> String {
        self.state()
            .registry
            .get(id)
            .and_then(|r| r.description.clone())
            .unwrap_or_default()
    }

    /// Ids of plugins declared with [`AutoStart::Startup`], sorted.
    pub fn auto_start_plugins(&self) -> Vec<String> {
        self.state().registry.ids_with(AutoStart::Startup)
    }

    /// Ids of plugins declared with [`AutoStart::Deferred`], sorted.
    pub fn deferred_plugins(&self) -> Vec<String> {
        self.state().registry.ids_with(AutoStart::Deferred)
    }

    /// Logs every failure in a batch of activation results.
    pub(crate) fn report_failures(results: &[(String, PluginResult<()>)], phase: &str) {
        for (id, result) in results {
            if let Err(e) = result {
                error!(plugin = %id, phase, error = %e, "Plugin failed to activate");
            }
        }
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("PluginManager")
            .field("plugins", &state.registry.list())
            .field("inflight", &state.inflight.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

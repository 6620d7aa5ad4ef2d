use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use kiln_core::{AnyToken, BoxError, ServiceArc};

use super::descriptor::PluginDescriptor;
use super::services::ResolvedServices;
use crate::manager::PluginManager;

/// Type-erased activate function stored inside a plugin record.
///
/// Receives the container handle and the resolved dependency list; produces
/// the plugin's service (a unit marker for plugins that provide nothing).
pub type ActivateFn = Arc<
    dyn Fn(PluginManager, ResolvedServices) -> BoxFuture<'static, Result<ServiceArc, BoxError>>
        + Send
        + Sync,
>;

/// Type-erased deactivate function stored inside a plugin record.
pub type DeactivateFn = Arc<
    dyn Fn(PluginManager, ResolvedServices) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;

// ─── AutoStart ────────────────────────────────────────────────────────────────

/// When a plugin is activated without anyone asking for it.
///
/// ```text
/// Never     ── only on demand (activate_plugin / as a dependency)
/// Startup   ── during Application::start
/// Deferred  ── after startup, via activate_deferred_plugins
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum AutoStart {
    #[default]
    Never,
    Startup,
    Deferred,
}

impl From<bool> for AutoStart {
    fn from(value: bool) -> Self {
        if value { Self::Startup } else { Self::Never }
    }
}

// ─── PluginRecord ─────────────────────────────────────────────────────────────

/// Runtime state of one registered plugin.
///
/// Owned by the [`Registry`](super::registry::Registry).  The declaration
/// fields never change after registration; `activated` and `service` are
/// written by the activation and deactivation engines and always move
/// together.
pub(crate) struct PluginRecord {
    pub(crate) id: String,
    pub(crate) description: Option<String>,
    pub(crate) auto_start: AutoStart,
    pub(crate) requires: Vec<AnyToken>,
    pub(crate) optional: Vec<AnyToken>,
    pub(crate) provides: Option<AnyToken>,
    pub(crate) activate: ActivateFn,
    pub(crate) deactivate: Option<DeactivateFn>,

    pub(crate) activated: bool,
    pub(crate) service: Option<ServiceArc>,
}

impl PluginRecord {
    pub(crate) fn from_descriptor(desc: PluginDescriptor) -> Self {
        Self {
            id: desc.id,
            description: desc.description,
            auto_start: desc.auto_start,
            requires: desc.requires,
            optional: desc.optional,
            provides: desc.provides,
            activate: desc.activate,
            deactivate: desc.deactivate,
            activated: false,
            service: None,
        }
    }

    /// Required tokens followed by optional tokens, in declared order.
    pub(crate) fn dependencies(&self) -> impl Iterator<Item = &AnyToken> {
        self.requires.iter().chain(self.optional.iter())
    }

    pub(crate) fn provides_token(&self, token: &AnyToken) -> bool {
        self.provides.as_ref() == Some(token)
    }

    pub(crate) fn has_dependencies(&self) -> bool {
        !self.requires.is_empty() || !self.optional.is_empty()
    }

    pub(crate) fn mark_activated(&mut self, service: ServiceArc) {
        self.activated = true;
        self.service = Some(service);
    }

    pub(crate) fn mark_deactivated(&mut self) {
        self.activated = false;
        self.service = None;
    }
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("id", &self.id)
            .field("auto_start", &self.auto_start)
            .field("requires", &self.requires)
            .field("optional", &self.optional)
            .field("provides", &self.provides)
            .field("has_deactivate", &self.deactivate.is_some())
            .field("activated", &self.activated)
            .finish_non_exhaustive()
    }
}

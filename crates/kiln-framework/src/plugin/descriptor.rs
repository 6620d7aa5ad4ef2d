//! Plugin declarations and their builder.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use kiln_core::{AnyToken, BoxError, ServiceArc, Token};

use super::core::{ActivateFn, AutoStart, DeactivateFn};
use super::services::ResolvedServices;
use crate::manager::PluginManager;

/// An immutable plugin declaration, ready to be registered.
///
/// Build one with [`PluginDescriptor::builder`]:
///
/// ```rust,ignore
/// let desc = PluginDescriptor::builder("clock")
///     .description("Wall clock service")
///     .auto_start(true)
///     .provides(&CLOCK, |_ctx, _services| async move {
///         Ok(Arc::new(SystemClock) as Arc<dyn Clock>)
///     })
///     .deactivate(|_ctx, _services| async move { Ok(()) })
///     .build();
/// ```
pub struct PluginDescriptor {
    pub(crate) id: String,
    pub(crate) description: Option<String>,
    pub(crate) auto_start: AutoStart,
    pub(crate) requires: Vec<AnyToken>,
    pub(crate) optional: Vec<AnyToken>,
    pub(crate) provides: Option<AnyToken>,
    pub(crate) activate: ActivateFn,
    pub(crate) deactivate: Option<DeactivateFn>,
}

impl PluginDescriptor {
    /// Starts a declaration for the plugin `id`.
    pub fn builder(id: impl Into<String>) -> PluginBuilder<NoService> {
        PluginBuilder {
            id: id.into(),
            description: None,
            auto_start: AutoStart::Never,
            requires: Vec::new(),
            optional: Vec::new(),
            deactivate: None,
            state: NoService { activate: None },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provides(&self) -> Option<&AnyToken> {
        self.provides.as_ref()
    }

    pub fn requires(&self) -> &[AnyToken] {
        &self.requires
    }

    pub fn optional(&self) -> &[AnyToken] {
        &self.optional
    }

    pub fn auto_start(&self) -> AutoStart {
        self.auto_start
    }

    pub fn has_deactivate(&self) -> bool {
        self.deactivate.is_some()
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("auto_start", &self.auto_start)
            .field("requires", &self.requires)
            .field("optional", &self.optional)
            .field("provides", &self.provides)
            .finish_non_exhaustive()
    }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Builder state: the plugin provides no service.
pub struct NoService {
    activate: Option<ActivateFn>,
}

/// Builder state: the plugin provides a service through a token.
pub struct ProvidesService {
    token: AnyToken,
    activate: ActivateFn,
}

/// Builder for [`PluginDescriptor`].
///
/// A plugin either provides nothing (set its behaviour with
/// [`activate`](PluginBuilder::activate)) or provides exactly one service
/// (use [`provides`](PluginBuilder::provides), which takes the activate
/// function together with the token so the returned value is type checked).
pub struct PluginBuilder<S> {
    id: String,
    description: Option<String>,
    auto_start: AutoStart,
    requires: Vec<AnyToken>,
    optional: Vec<AnyToken>,
    deactivate: Option<DeactivateFn>,
    state: S,
}

impl<S> PluginBuilder<S> {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Accepts an [`AutoStart`] or a `bool`.
    pub fn auto_start(mut self, auto_start: impl Into<AutoStart>) -> Self {
        self.auto_start = auto_start.into();
        self
    }

    /// Adds a required dependency.  Order of calls is the argument order.
    pub fn requires<T: ?Sized>(mut self, token: &Token<T>) -> Self {
        self.requires.push(token.erase());
        self
    }

    /// Adds an optional dependency.  Optional entries follow required ones.
    pub fn optional<T: ?Sized>(mut self, token: &Token<T>) -> Self {
        self.optional.push(token.erase());
        self
    }

    /// Sets the teardown function.
    ///
    /// Without one the plugin cannot be deactivated, and neither can anything
    /// it depends on.
    pub fn deactivate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PluginManager, ResolvedServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.deactivate = Some(Arc::new(move |ctx, services| f(ctx, services).boxed()));
        self
    }

    fn finish(self, provides: Option<AnyToken>, activate: ActivateFn) -> PluginDescriptor {
        PluginDescriptor {
            id: self.id,
            description: self.description,
            auto_start: self.auto_start,
            requires: self.requires,
            optional: self.optional,
            provides,
            activate,
            deactivate: self.deactivate,
        }
    }
}

impl PluginBuilder<NoService> {
    /// Sets the activate function of a plugin that provides nothing.
    pub fn activate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PluginManager, ResolvedServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.state.activate = Some(Arc::new(move |ctx, services| {
            let f = Arc::clone(&f);
            async move {
                f(ctx, services).await?;
                Ok::<_, BoxError>(unit_service())
            }
            .boxed()
        }));
        self
    }

    /// Declares the provided service and the activate function producing it.
    pub fn provides<T, F, Fut>(self, token: &Token<T>, f: F) -> PluginBuilder<ProvidesService>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(PluginManager, ResolvedServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, BoxError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let wrapper = token.clone();
        let activate: ActivateFn = Arc::new(move |ctx, services| {
            let f = Arc::clone(&f);
            let wrapper = wrapper.clone();
            async move {
                let service = f(ctx, services).await?;
                Ok::<_, BoxError>(wrapper.wrap(service))
            }
            .boxed()
        });
        PluginBuilder {
            id: self.id,
            description: self.description,
            auto_start: self.auto_start,
            requires: self.requires,
            optional: self.optional,
            deactivate: self.deactivate,
            state: ProvidesService {
                token: token.erase(),
                activate,
            },
        }
    }

    /// Finishes the declaration.  Without an activate function the plugin
    /// activates as a no-op.
    pub fn build(mut self) -> PluginDescriptor {
        let activate = match self.state.activate.take() {
            Some(activate) => activate,
            None => noop_activate(),
        };
        self.finish(None, activate)
    }
}

impl PluginBuilder<ProvidesService> {
    /// Finishes the declaration.
    pub fn build(self) -> PluginDescriptor {
        let ProvidesService { token, activate } = self.state;
        PluginBuilder {
            id: self.id,
            description: self.description,
            auto_start: self.auto_start,
            requires: self.requires,
            optional: self.optional,
            deactivate: self.deactivate,
            state: (),
        }
        .finish(Some(token), activate)
    }
}

/// Service value recorded for plugins that provide nothing.
fn unit_service() -> ServiceArc {
    Arc::new(())
}

fn noop_activate() -> ActivateFn {
    Arc::new(|_: PluginManager, _: ResolvedServices| {
        futures::future::ready(Ok::<_, BoxError>(unit_service())).boxed()
    })
}

impl From<PluginBuilder<NoService>> for PluginDescriptor {
    fn from(builder: PluginBuilder<NoService>) -> Self {
        builder.build()
    }
}

impl From<PluginBuilder<ProvidesService>> for PluginDescriptor {
    fn from(builder: PluginBuilder<ProvidesService>) -> Self {
        builder.build()
    }
}

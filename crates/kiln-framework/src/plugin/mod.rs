//! Plugin declarations and the registry that holds them.
//!
//! # Architecture
//!
//! A plugin is declared once as a [`PluginDescriptor`]: an id, the tokens it
//! requires and optionally uses, at most one token it provides, and its
//! activate / deactivate functions.  Registration turns the descriptor into a
//! private record that also tracks whether the plugin is active and, if so,
//! the service it produced.
//!
//! Dependencies are expressed through [`Token`](kiln_core::Token)s rather than
//! plugin ids, so a consumer never names its provider.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use kiln::prelude::*;
//!
//! pub trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! pub static CLOCK: LazyLock<Token<dyn Clock>> = LazyLock::new(|| Token::new("clock"));
//!
//! let clock = PluginDescriptor::builder("clock")
//!     .auto_start(true)
//!     .provides(&CLOCK, |_ctx, _services| async move {
//!         Ok(Arc::new(SystemClock) as Arc<dyn Clock>)
//!     })
//!     .deactivate(|_ctx, _services| async move { Ok(()) });
//!
//! let status_bar = PluginDescriptor::builder("status-bar")
//!     .requires(&CLOCK)
//!     .activate(|ctx, services| async move {
//!         let clock = services.require(&CLOCK)?;
//!         ctx.commands().add_command("status.time", handler_fn(move |_| {
//!             let clock = Arc::clone(&clock);
//!             async move { Ok(json!(clock.now())) }
//!         }))?;
//!         Ok(())
//!     });
//! ```

// ─── Submodules ──────────────────────────────────────────────────────────────
pub mod core;
pub mod descriptor;
pub(crate) mod registry;
pub mod services;

// ─── Re-exports from submodules ──────────────────────────────────────────────
pub use self::core::{ActivateFn, AutoStart, DeactivateFn};
pub use descriptor::{NoService, PluginBuilder, PluginDescriptor, ProvidesService};
pub use services::ResolvedServices;

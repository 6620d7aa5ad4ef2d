//! # Kiln
//!
//! A typed plugin container: plugins declare the services they provide and
//! require through [`Token`](prelude::Token)s, are activated lazily with their
//! dependencies resolved first, and are torn down together with everything
//! that depends on them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   start    ┌────────────────────┐  activate   ┌──────────────┐
//! │ Application  │──────────▶│ StartupCoordinator │────────────▶│ PluginManager│
//! │  (runtime)   │            └────────────────────┘             │ (framework)  │
//! └──────────────┘                                               │  registry    │
//!        │ mount callback, startup-completion signal             │  activation  │
//!        ▼                                                       │  teardown    │
//!    host UI                                                     └──────────────┘
//! ```
//!
//! - **kiln-core**: tokens, the dependency graph, the command registry
//! - **kiln-framework**: plugin declarations and the container
//! - **kiln-runtime**: configuration, logging and the startup sequence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kiln::prelude::*;
//!
//! static GREETING: LazyLock<Token<String>> = LazyLock::new(|| Token::new("greeting"));
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = Application::new();
//!
//!     app.register_plugin(
//!         PluginDescriptor::builder("greeting")
//!             .provides(&GREETING, |_, _| async { Ok(Arc::new("hello".to_string())) }),
//!     )?;
//!     app.register_plugin(
//!         PluginDescriptor::builder("printer")
//!             .auto_start(true)
//!             .requires(&GREETING)
//!             .activate(|_, services| async move {
//!                 println!("{}", services.require(&GREETING)?);
//!                 Ok(())
//!             }),
//!     )?;
//!
//!     app.start(StartOptions::new()).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): load `kiln.toml`
//! - `yaml-config`: load `kiln.yaml` / `kiln.yml`
//! - `json-log`: JSON log output

pub use kiln_core as core;
pub use kiln_framework as framework;
pub use kiln_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use kiln::prelude::*;
/// ```
pub mod prelude {
    // Application shell - main entry point
    pub use kiln_runtime::{Application, StartOptions, StartupReport};

    // Plugin declarations and the container
    pub use kiln_framework::{
        AutoStart, ClosureEdges, ManagerOptions, PluginDescriptor, PluginError, PluginManager,
        PluginResult, ResolvedServices,
    };

    // Tokens and commands
    pub use kiln_core::{BoxError, CommandRegistry, Token, handler_fn};

    pub use std::sync::{Arc, LazyLock};
}

//! The application shell: one plugin container plus its startup sequence.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kiln_runtime::{Application, StartOptions};
//!
//! // Auto-loads kiln.toml / kiln.yaml from the current directory
//! let app = Application::new();
//! app.register_plugins([clock_plugin(), status_bar_plugin()])?;
//!
//! app.on_mount(|manager| {
//!     println!("ready with {} plugins", manager.list_plugins().len());
//! });
//!
//! let report = app.start(StartOptions::new().ignore("telemetry")).await;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use kiln_core::CommandRegistry;
use kiln_framework::{ManagerOptions, PluginDescriptor, PluginManager};
use tracing::{debug, info};

use crate::config::{ConfigLoader, KilnConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use crate::startup::{StartOptions, StartupCoordinator, StartupReport};

/// A plugin container wired to configuration, logging and startup.
///
/// Each `Application` owns its own [`PluginManager`]; two applications in one
/// process share nothing.
pub struct Application {
    config: KilnConfig,
    manager: PluginManager,
    startup: StartupCoordinator,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    /// Creates an application with automatic configuration loading.
    ///
    /// If no configuration file is found, or it fails to load, default
    /// settings are used.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            KilnConfig::default()
        });
        Self::from_config(&config)
    }

    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Creates an application from an already loaded configuration.
    ///
    /// Initializes logging from `config.logging` unless a subscriber is
    /// already installed.
    pub fn from_config(config: &KilnConfig) -> Self {
        Self::with_options(config, config.plugins.manager_options())
    }

    fn with_options(config: &KilnConfig, options: ManagerOptions) -> Self {
        logging::init_from_config(&config.logging);

        let manager = PluginManager::with_options(options);
        info!(
            log_level     = %config.logging.level,
            closure_edges = ?options.closure_edges,
            "Application initialized"
        );

        Self {
            config: config.clone(),
            startup: StartupCoordinator::new(manager.clone()),
            manager,
        }
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    /// The plugin container.  Clones share the same graph.
    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        self.manager.commands()
    }

    pub fn register_plugin(&self, plugin: impl Into<PluginDescriptor>) -> RuntimeResult<()> {
        Ok(self.manager.register_plugin(plugin)?)
    }

    /// Registers plugins in order, stopping at the first failure.
    pub fn register_plugins<I>(&self, plugins: I) -> RuntimeResult<()>
    where
        I: IntoIterator,
        I::Item: Into<PluginDescriptor>,
    {
        Ok(self.manager.register_plugins(plugins)?)
    }

    /// Sets the callback run once after the startup plugins have settled.
    pub fn on_mount<F>(&self, f: F)
    where
        F: FnOnce(&PluginManager) + Send + 'static,
    {
        self.startup.on_mount(f);
    }

    /// Runs the startup sequence.
    ///
    /// `options` are merged with the `[startup]` section of the configuration.
    /// Idempotent: later calls wait for and return the first run's report.
    pub async fn start(&self, options: StartOptions) -> StartupReport {
        let options = options.merged_with(&self.config.startup);
        debug!(?options, "Start requested");
        self.startup.start(options).await
    }

    /// Resolves once startup has completed.
    pub async fn started(&self) {
        self.startup.started().await;
    }

    pub fn is_started(&self) -> bool {
        self.startup.is_started()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("manager", &self.manager)
            .field("startup", &self.startup)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for an [`Application`] with custom configuration sources.
///
/// ```rust,ignore
/// let app = Application::builder()
///     .config_file("config/kiln.toml")
///     .profile("production")
///     .build()?;
/// ```
#[derive(Default)]
pub struct ApplicationBuilder {
    config: Option<KilnConfig>,
    config_file: Option<PathBuf>,
    profile: Option<String>,
    options: Option<ManagerOptions>,
    load_env: bool,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            load_env: true,
            ..Default::default()
        }
    }

    /// Uses `config` as-is instead of loading one.
    pub fn config(mut self, config: KilnConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Overrides the container options from `[plugins]`.
    pub fn options(mut self, options: ManagerOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Loads and validates the configuration, then builds the application.
    pub fn build(self) -> RuntimeResult<Application> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let mut loader = ConfigLoader::new();
                if let Some(path) = &self.config_file {
                    loader = loader.file(path);
                }
                if let Some(profile) = &self.profile {
                    loader = loader.profile(profile);
                }
                if !self.load_env {
                    loader = loader.without_env();
                }
                loader.load()?
            }
        };
        validate_config(&config)?;

        let options = self
            .options
            .unwrap_or_else(|| config.plugins.manager_options());
        Ok(Application::with_options(&config, options))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use kiln_core::{BoxError, Token};
    use kiln_framework::{AutoStart, ClosureEdges, PluginError};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::RuntimeError;
    use crate::config::{ConfigError, LogOutput};

    fn app_with(config: KilnConfig) -> Application {
        assert_ok!(Application::builder().config(config).build())
    }

    #[tokio::test]
    async fn test_start_merges_config_lists() {
        let mut config = KilnConfig::default();
        config.startup.start_plugins.push("configured".into());
        config.startup.ignore_plugins.push("noisy".into());
        let app = app_with(config);

        for (id, auto) in [
            ("configured", AutoStart::Never),
            ("explicit", AutoStart::Never),
            ("noisy", AutoStart::Startup),
            ("auto", AutoStart::Startup),
        ] {
            assert_ok!(app.register_plugin(PluginDescriptor::builder(id).auto_start(auto)));
        }

        let report = app.start(StartOptions::new().start("explicit")).await;

        assert!(report.is_clean());
        assert_eq!(report.activated, vec!["auto", "configured", "explicit"]);
        assert!(!app.manager().is_plugin_activated("noisy"));
        assert!(app.is_started());
    }

    #[tokio::test]
    async fn test_mount_sees_started_plugins() {
        let app = app_with(KilnConfig::default());
        let token: Token<&'static str> = Token::new("greeting");
        assert_ok!(app.register_plugin(
            PluginDescriptor::builder("greeter")
                .auto_start(true)
                .provides(&token, |_, _| async { Ok::<_, BoxError>(Arc::new("hi")) })
        ));

        let mounted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&mounted);
        app.on_mount(move |manager| {
            flag.store(manager.is_plugin_activated("greeter"), Ordering::SeqCst);
        });

        app.start(StartOptions::new()).await;
        app.started().await;
        assert!(mounted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_builder_applies_options() {
        let mut config = KilnConfig::default();
        config.plugins.closure_edges = ClosureEdges::RequiredOnly;

        let app = app_with(config.clone());
        assert_eq!(app.manager().options().closure_edges, ClosureEdges::RequiredOnly);

        let app = assert_ok!(
            Application::builder()
                .config(config)
                .options(ManagerOptions::default())
                .build()
        );
        assert_eq!(app.manager().options().closure_edges, ClosureEdges::All);
    }

    #[test]
    fn test_builder_validates() {
        let mut config = KilnConfig::default();
        config.logging.output = LogOutput::File;

        let err = assert_err!(Application::builder().config(config).build());
        assert!(matches!(err, RuntimeError::Config(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_register_errors_are_wrapped() {
        let app = app_with(KilnConfig::default());
        assert_ok!(app.register_plugin(PluginDescriptor::builder("dup")));

        let err = assert_err!(app.register_plugin(PluginDescriptor::builder("dup")));
        assert!(matches!(err, RuntimeError::Plugin(PluginError::DuplicateId(_))));
    }

    #[test]
    fn test_applications_are_independent() {
        let a = app_with(KilnConfig::default());
        let b = app_with(KilnConfig::default());
        assert_ok!(a.register_plugin(PluginDescriptor::builder("only-in-a")));

        assert!(a.manager().has_plugin("only-in-a"));
        assert!(!b.manager().has_plugin("only-in-a"));
        assert!(!a.manager().ptr_eq(b.manager()));
    }
}

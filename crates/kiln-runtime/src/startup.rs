//! Startup sequence.
//!
//! ```text
//! start(options)                       (first call only; later calls join)
//!   ├─ set = (auto_start plugins ∪ options.start) ∖ options.ignore
//!   ├─ activate every id in the set concurrently
//!   ├─ log each failure, keep going
//!   ├─ run the mount callback (once)
//!   └─ fire the startup-completion signal (once)
//! ```
//!
//! The returned [`StartupHandle`] is a shared future: every clone resolves to
//! the same [`StartupReport`].  The work runs when a handle is first polled.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use kiln_framework::{PluginError, PluginManager};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::StartupConfig;

/// Handle to the (single) startup run.
pub type StartupHandle = Shared<BoxFuture<'static, StartupReport>>;

/// Callback run once after the startup set has settled.
pub type MountFn = Box<dyn FnOnce(&PluginManager) + Send>;

/// Explicit additions to and removals from the startup set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub start_plugins: Vec<String>,
    pub ignore_plugins: Vec<String>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates `id` at startup even without `auto_start`.
    pub fn start(mut self, id: impl Into<String>) -> Self {
        self.start_plugins.push(id.into());
        self
    }

    /// Keeps `id` out of the startup set.  Wins over `start` and `auto_start`.
    pub fn ignore(mut self, id: impl Into<String>) -> Self {
        self.ignore_plugins.push(id.into());
        self
    }

    /// Unions both lists with the configured ones.
    pub fn merged_with(mut self, config: &StartupConfig) -> Self {
        self.start_plugins.extend(config.start_plugins.iter().cloned());
        self.ignore_plugins.extend(config.ignore_plugins.iter().cloned());
        self
    }
}

impl From<&StartupConfig> for StartOptions {
    fn from(config: &StartupConfig) -> Self {
        Self {
            start_plugins: config.start_plugins.clone(),
            ignore_plugins: config.ignore_plugins.clone(),
        }
    }
}

/// Outcome of the startup run.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    /// Ids that activated, sorted.
    pub activated: Vec<String>,
    /// Ids that failed, sorted, with their error.
    pub failed: Vec<(String, PluginError)>,
}

impl StartupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Inner {
    manager: PluginManager,
    handle: Mutex<Option<StartupHandle>>,
    mount: Mutex<Option<MountFn>>,
    done: watch::Sender<bool>,
}

/// Drives the one-time startup activation of a [`PluginManager`].
#[derive(Clone)]
pub struct StartupCoordinator {
    inner: Arc<Inner>,
}

impl StartupCoordinator {
    pub fn new(manager: PluginManager) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                manager,
                handle: Mutex::new(None),
                mount: Mutex::new(None),
                done,
            }),
        }
    }

    pub fn manager(&self) -> &PluginManager {
        &self.inner.manager
    }

    /// Sets the callback run after startup settles, replacing any previous
    /// one.  Has no effect once the callback has run.
    pub fn on_mount<F>(&self, f: F)
    where
        F: FnOnce(&PluginManager) + Send + 'static,
    {
        *self.inner.mount.lock() = Some(Box::new(f));
    }

    /// Starts the startup run, or returns the existing one.
    ///
    /// Only the first call's `options` are used.
    pub fn start(&self, options: StartOptions) -> StartupHandle {
        let mut slot = self.inner.handle.lock();
        if let Some(handle) = slot.as_ref() {
            debug!("Startup already requested, joining");
            return handle.clone();
        }

        let ids = startup_set(&self.inner.manager, &options);
        info!(count = ids.len(), plugins = ?ids, "Starting plugins");

        let inner = Arc::clone(&self.inner);
        let handle = run(inner, ids)
            .instrument(info_span!("startup"))
            .boxed()
            .shared();
        *slot = Some(handle.clone());
        handle
    }

    /// Returns `true` once a startup run has been requested.
    pub fn is_requested(&self) -> bool {
        self.inner.handle.lock().is_some()
    }

    /// Returns `true` once startup has completed.
    pub fn is_started(&self) -> bool {
        *self.inner.done.borrow()
    }

    /// Resolves once startup has completed.
    pub async fn started(&self) {
        let mut rx = self.inner.done.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl fmt::Debug for StartupCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupCoordinator")
            .field("requested", &self.is_requested())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

/// `(auto_start ∪ start) ∖ ignore`, sorted.
fn startup_set(manager: &PluginManager, options: &StartOptions) -> Vec<String> {
    let ignored: BTreeSet<&str> = options.ignore_plugins.iter().map(String::as_str).collect();
    let mut set: BTreeSet<String> = manager.auto_start_plugins().into_iter().collect();
    set.extend(options.start_plugins.iter().cloned());
    set.retain(|id| !ignored.contains(id.as_str()));
    set.into_iter().collect()
}

async fn run(inner: Arc<Inner>, ids: Vec<String>) -> StartupReport {
    let results = inner.manager.activate_plugins(ids).await;

    let mut report = StartupReport::default();
    for (id, result) in results {
        match result {
            Ok(()) => report.activated.push(id),
            Err(e) => {
                error!(plugin = %id, error = %e, "Plugin failed to start");
                report.failed.push((id, e));
            }
        }
    }

    let mount = inner.mount.lock().take();
    if let Some(mount) = mount {
        debug!("Running mount callback");
        mount(&inner.manager);
    }

    inner.done.send_replace(true);
    info!(
        activated = report.activated.len(),
        failed    = report.failed.len(),
        "Startup complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kiln_core::BoxError;
    use kiln_framework::{AutoStart, PluginDescriptor};
    use tokio_test::assert_ok;

    use super::*;

    fn counting(id: &str, auto_start: AutoStart, calls: &Arc<AtomicUsize>) -> PluginDescriptor {
        let calls = Arc::clone(calls);
        PluginDescriptor::builder(id)
            .auto_start(auto_start)
            .activate(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(()) }
            })
            .build()
    }

    #[test]
    fn test_startup_set() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = PluginManager::new();
        for (id, auto) in [
            ("auto", AutoStart::Startup),
            ("auto-ignored", AutoStart::Startup),
            ("manual", AutoStart::Never),
            ("later", AutoStart::Deferred),
        ] {
            assert_ok!(manager.register_plugin(counting(id, auto, &calls)));
        }

        let options = StartOptions::new()
            .start("manual")
            .start("ghost")
            .ignore("auto-ignored")
            .ignore("ghost");
        assert_eq!(startup_set(&manager, &options), vec!["auto", "manual"]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(counting("a", AutoStart::Startup, &calls)));
        assert_ok!(manager.register_plugin(counting("b", AutoStart::Never, &calls)));

        let coordinator = StartupCoordinator::new(manager.clone());
        let first = coordinator.start(StartOptions::new());
        let second = coordinator.start(StartOptions::new().start("b"));
        let (r1, r2) = tokio::join!(first, second);

        assert_eq!(r1.activated, vec!["a"]);
        assert_eq!(r2.activated, vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!manager.is_plugin_activated("b"));

        let again = coordinator.start(StartOptions::new()).await;
        assert_eq!(again.activated, vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_startup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(counting("ok", AutoStart::Startup, &calls)));
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("bad")
                .auto_start(true)
                .activate(|_, _| async { Err::<(), BoxError>("boom".into()) })
        ));

        let coordinator = StartupCoordinator::new(manager.clone());
        let report = coordinator.start(StartOptions::new().start("missing")).await;

        assert_eq!(report.activated, vec!["ok"]);
        let failed: Vec<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["bad", "missing"]);
        assert!(matches!(report.failed[1].1, PluginError::NotRegistered(_)));
        assert!(coordinator.is_started());
    }

    #[tokio::test]
    async fn test_mount_runs_once_before_signal() {
        let manager = PluginManager::new();
        let coordinator = StartupCoordinator::new(manager);
        let mounted = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&mounted);
        let observer = coordinator.clone();
        coordinator.on_mount(move |_| {
            assert!(!observer.is_started());
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let waiter = coordinator.clone();
        let wait = tokio::spawn(async move { waiter.started().await });
        assert!(!coordinator.is_started());

        coordinator.start(StartOptions::new()).await;
        coordinator.start(StartOptions::new()).await;
        assert_ok!(wait.await);

        assert_eq!(mounted.load(Ordering::SeqCst), 1);
        assert!(coordinator.is_started());
    }
}

//! Activation engine.
//!
//! ```text
//! activate_plugin(id)
//!   ├─ unknown id          → NotRegistered
//!   ├─ already activated   → Ok(())
//!   ├─ in-flight handle    → join it
//!   └─ otherwise           → new handle:
//!        resolve requires (declared order, failures propagate)
//!        resolve optional (declared order, failures become "no service")
//!        call activate(container, services)
//!        record service, clear the in-flight entry
//! ```
//!
//! The in-flight table maps a plugin id to a [`Shared`] future.  Every caller
//! that arrives while an attempt is running awaits the same handle, so the
//! plugin's activate function runs at most once per attempt and every caller
//! sees the same outcome.  The entry is removed when the attempt settles,
//! successfully or not; a failed plugin can be activated again later.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use kiln_core::{AnyToken, ServiceArc, Token, share_error};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{PluginError, PluginResult};
use crate::manager::PluginManager;
use crate::plugin::core::ActivateFn;
use crate::plugin::{AutoStart, ResolvedServices};

/// A shareable handle to one activation attempt.
pub(crate) type ActivationHandle = Shared<BoxFuture<'static, PluginResult<()>>>;

/// Activation attempts currently underway, keyed by plugin id.
#[derive(Default)]
pub(crate) struct InflightTable {
    handles: HashMap<String, ActivationHandle>,
}

impl InflightTable {
    pub(crate) fn get(&self, id: &str) -> Option<ActivationHandle> {
        self.handles.get(id).cloned()
    }

    pub(crate) fn insert(&mut self, id: String, handle: ActivationHandle) {
        self.handles.insert(id, handle);
    }

    pub(crate) fn remove(&mut self, id: &str) {
        self.handles.remove(id);
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Everything an attempt needs, copied out of the record so the lock can be
/// released before any dependency is awaited.
struct ActivationJob {
    id: String,
    requires: Vec<AnyToken>,
    optional: Vec<AnyToken>,
    activate: ActivateFn,
}

impl PluginManager {
    /// Activates a plugin and, first, everything it requires.
    ///
    /// Resolves immediately if the plugin is already active; joins the running
    /// attempt if one exists.
    pub async fn activate_plugin(&self, id: &str) -> PluginResult<()> {
        self.activation(id.to_string()).await
    }

    /// Activates several plugins concurrently and reports each outcome.
    ///
    /// A failure does not stop the others.
    pub async fn activate_plugins<I, S>(&self, ids: I) -> Vec<(String, PluginResult<()>)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        future::join_all(ids.into_iter().map(|id| {
            let id = id.into();
            let attempt = self.activation(id.clone());
            async move { (id, attempt.await) }
        }))
        .await
    }

    /// Activates every plugin declared with [`AutoStart::Deferred`].
    ///
    /// Failures are logged and returned; they never abort the batch.
    pub async fn activate_deferred_plugins(&self) -> Vec<(String, PluginResult<()>)> {
        let ids = self.state().registry.ids_with(AutoStart::Deferred);
        debug!(count = ids.len(), "Activating deferred plugins");
        let results = self.activate_plugins(ids).await;
        Self::report_failures(&results, "deferred");
        results
    }

    /// Returns `true` while an activation attempt for `id` is underway.
    pub fn is_activation_pending(&self, id: &str) -> bool {
        self.state().inflight.contains(id)
    }

    /// Resolves a required service, activating its provider if needed.
    ///
    /// Fails with [`PluginError::NoProvider`] when nothing (live) provides the
    /// token, or with the provider's own activation error.
    pub async fn resolve_required_service<T>(&self, token: &Token<T>) -> PluginResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service = self.resolve_required(token.erase()).await?;
        token
            .downcast(&service)
            .ok_or_else(|| PluginError::ServiceTypeMismatch {
                token: token.name().to_string(),
            })
    }

    /// Resolves an optional service.  Never fails: a missing provider or a
    /// failed activation both yield `None`.
    pub async fn resolve_optional_service<T>(&self, token: &Token<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service = self.resolve_optional(token.erase()).await?;
        token.downcast(&service)
    }

    // ─── Engine internals ────────────────────────────────────────────────────

    /// Returns the attempt for `id`: settled, joined, or freshly started.
    ///
    /// Boxed so that activation can recurse through dependency resolution.
    pub(crate) fn activation(&self, id: String) -> BoxFuture<'static, PluginResult<()>> {
        let handle = {
            let mut state = self.state();
            let Some(record) = state.registry.get(&id) else {
                return future::ready(Err(PluginError::NotRegistered(id))).boxed();
            };
            if record.activated {
                return future::ready(Ok(())).boxed();
            }
            if let Some(handle) = state.inflight.get(&id) {
                debug!(plugin = %id, "Joining in-flight activation");
                handle
            } else {
                let job = ActivationJob {
                    id: id.clone(),
                    requires: record.requires.clone(),
                    optional: record.optional.clone(),
                    activate: Arc::clone(&record.activate),
                };
                let span = info_span!("activate", plugin = %id);
                let handle = self.clone().run(job).instrument(span).boxed().shared();
                state.inflight.insert(id, handle.clone());
                handle
            }
        };
        handle.boxed()
    }

    async fn run(self, job: ActivationJob) -> PluginResult<()> {
        let outcome = self.resolve_and_activate(&job).await;

        let mut state = self.state();
        state.inflight.remove(&job.id);
        match outcome {
            Ok(service) => match state.registry.get_mut(&job.id) {
                Some(record) => {
                    record.mark_activated(service);
                    info!(plugin = %job.id, "Plugin activated");
                    Ok(())
                }
                None => {
                    warn!(plugin = %job.id, "Plugin was unregistered while activating");
                    Err(PluginError::NotRegistered(job.id))
                }
            },
            Err(e) => {
                warn!(plugin = %job.id, error = %e, "Plugin activation failed");
                Err(e)
            }
        }
    }

    async fn resolve_and_activate(&self, job: &ActivationJob) -> PluginResult<ServiceArc> {
        let mut entries = Vec::with_capacity(job.requires.len() + job.optional.len());
        for token in &job.requires {
            let service = self.resolve_required(token.clone()).await?;
            entries.push((token.clone(), Some(service)));
        }
        for token in &job.optional {
            let service = self.resolve_optional(token.clone()).await;
            entries.push((token.clone(), service));
        }

        (job.activate)(self.clone(), ResolvedServices::new(entries))
            .await
            .map_err(|e| PluginError::ActivationFailed {
                id: job.id.clone(),
                cause: share_error(e),
            })
    }

    fn provider_id(&self, token: &AnyToken) -> Option<String> {
        self.state().registry.provider_of(token).map(|p| p.id.clone())
    }

    fn service_of(&self, id: &str) -> Option<ServiceArc> {
        self.state()
            .registry
            .get(id)
            .and_then(|r| r.service.clone())
    }

    pub(crate) fn resolve_required(
        &self,
        token: AnyToken,
    ) -> BoxFuture<'static, PluginResult<ServiceArc>> {
        let manager = self.clone();
        async move {
            let no_provider = || PluginError::NoProvider {
                token: token.name().to_string(),
            };
            let provider = manager.provider_id(&token).ok_or_else(no_provider)?;
            manager.activation(provider.clone()).await?;
            manager.service_of(&provider).ok_or_else(no_provider)
        }
        .boxed()
    }

    pub(crate) fn resolve_optional(&self, token: AnyToken) -> BoxFuture<'static, Option<ServiceArc>> {
        let manager = self.clone();
        async move {
            let provider = manager.provider_id(&token)?;
            match manager.activation(provider.clone()).await {
                Ok(()) => manager.service_of(&provider),
                Err(e) => {
                    warn!(
                        service  = %token,
                        provider = %provider,
                        error    = %e,
                        "Optional service unavailable"
                    );
                    None
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kiln_core::BoxError;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::plugin::PluginDescriptor;

    #[tokio::test]
    async fn test_activate_unknown() {
        let manager = PluginManager::new();
        let err = assert_err!(manager.activate_plugin("nope").await);
        assert!(matches!(err, PluginError::NotRegistered(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_arguments_required_then_optional() {
        let a: Token<&'static str> = Token::new("a");
        let b: Token<&'static str> = Token::new("b");
        let c: Token<&'static str> = Token::new("c");
        let missing: Token<&'static str> = Token::new("missing");
        let seen = Arc::new(parking_lot::Mutex::new(Vec::<Option<&'static str>>::new()));

        let manager = PluginManager::new();
        for (id, token) in [("pa", &a), ("pb", &b), ("pc", &c)] {
            assert_ok!(manager.register_plugin(
                PluginDescriptor::builder(id).provides(token, move |_, _| async move {
                    Ok::<_, BoxError>(Arc::new(id))
                })
            ));
        }
        let (a2, b2, c2, m2) = (a.clone(), b.clone(), c.clone(), missing.clone());
        let seen2 = Arc::clone(&seen);
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("consumer")
                .requires(&b)
                .optional(&missing)
                .optional(&c)
                .requires(&a)
                .activate(move |_, services| {
                    let seen = Arc::clone(&seen2);
                    let tokens = [b2.clone(), a2.clone(), m2.clone(), c2.clone()];
                    async move {
                        let names: Vec<&str> = services.tokens().map(AnyToken::name).collect();
                        assert_eq!(names, vec!["b", "a", "missing", "c"]);
                        assert!(services.at(2).is_none());

                        let mut seen = seen.lock();
                        for token in &tokens {
                            seen.push(services.get(token).map(|s| *s));
                        }
                        Ok::<_, BoxError>(())
                    }
                })
        ));

        assert_ok!(manager.activate_plugin("consumer").await);
        assert_eq!(
            *seen.lock(),
            vec![Some("pb"), Some("pa"), None, Some("pc")]
        );
    }

    #[tokio::test]
    async fn test_concurrent_activation_runs_once() {
        let token: Token<usize> = Token::new("slow");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let manager = PluginManager::new();
        let (calls2, gate2) = (Arc::clone(&calls), Arc::clone(&gate));
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("slow").provides(
            &token,
            move |_, _| {
                let calls = Arc::clone(&calls2);
                let gate = Arc::clone(&gate2);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    Ok::<_, BoxError>(Arc::new(n))
                }
            },
        )));

        let first = manager.activate_plugin("slow");
        let second = manager.activate_plugin("slow");
        let release = async {
            tokio::task::yield_now().await;
            assert!(manager.is_activation_pending("slow"));
            gate.notify_one();
        };
        let (r1, r2, ()) = tokio::join!(first, second, release);

        assert_ok!(r1);
        assert_ok!(r2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!manager.is_activation_pending("slow"));

        let x = assert_ok!(manager.resolve_required_service(&token).await);
        let y = assert_ok!(manager.resolve_required_service(&token).await);
        assert!(Arc::ptr_eq(&x, &y));
    }

    #[tokio::test]
    async fn test_failed_activation_can_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = Arc::clone(&attempts);

        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("flaky").activate(
            move |_, _| {
                let attempts = Arc::clone(&attempts2);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err::<(), BoxError>("first try fails".into())
                    } else {
                        Ok::<_, BoxError>(())
                    }
                }
            },
        )));

        let err = assert_err!(manager.activate_plugin("flaky").await);
        assert!(matches!(err, PluginError::ActivationFailed { ref id, .. } if id == "flaky"));
        assert!(!manager.is_plugin_activated("flaky"));
        assert!(!manager.is_activation_pending("flaky"));

        assert_ok!(manager.activate_plugin("flaky").await);
        assert!(manager.is_plugin_activated("flaky"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_optional_failure_is_swallowed() {
        let broken: Token<u8> = Token::new("broken");
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("broken").provides(
            &broken,
            |_, _| async { Err::<Arc<u8>, BoxError>("no".into()) },
        )));
        let wanted = broken.clone();
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("tolerant")
                .optional(&broken)
                .activate(move |_, services| {
                    let present = services.is_present(&wanted);
                    async move {
                        assert!(!present);
                        Ok::<_, BoxError>(())
                    }
                })
        ));

        assert_ok!(manager.activate_plugin("tolerant").await);
        assert!(manager.is_plugin_activated("tolerant"));
        assert!(!manager.is_plugin_activated("broken"));
        assert!(manager.resolve_optional_service(&broken).await.is_none());
    }

    #[tokio::test]
    async fn test_plugins_can_activate_through_container() {
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("side").build()));
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("main").activate(
            |ctx, _| async move {
                ctx.activate_plugin("side").await?;
                Ok::<_, BoxError>(())
            },
        )));

        assert_ok!(manager.activate_plugin("main").await);
        assert!(manager.is_plugin_activated("side"));
    }

    #[tokio::test]
    async fn test_deferred_plugins() {
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("later").auto_start(AutoStart::Deferred)
        ));
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("now").auto_start(true)));

        assert_eq!(manager.deferred_plugins(), vec!["later"]);
        assert_eq!(manager.auto_start_plugins(), vec!["now"]);

        let results = manager.activate_deferred_plugins().await;
        assert_eq!(results.len(), 1);
        assert!(manager.is_plugin_activated("later"));
        assert!(!manager.is_plugin_activated("now"));
    }
}

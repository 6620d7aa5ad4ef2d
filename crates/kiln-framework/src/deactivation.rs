//! Deactivation engine.
//!
//! Deactivating a plugin tears down its *dependent closure*: every plugin that
//! reaches it through required (and, by default, optional) dependency edges.
//! The order comes from one topological sort of that closure, dependents
//! first and the target last.
//!
//! The operation is all-or-nothing up front: if any plugin in the closure has
//! no teardown function, nothing is torn down.  Once teardown starts, every
//! teardown runs to completion; failures are collected and reported together,
//! and a plugin whose teardown failed stays activated.

use futures::future;
use kiln_core::{SharedError, share_error};
use tracing::{debug, error, info};

use crate::error::{PluginError, PluginResult, TeardownRelation};
use crate::manager::{ClosureEdges, PluginManager};
use crate::plugin::ResolvedServices;
use crate::plugin::core::DeactivateFn;

struct TeardownJob {
    id: String,
    deactivate: DeactivateFn,
    services: ResolvedServices,
}

impl PluginManager {
    /// Deactivates `id` and everything that depends on it.
    ///
    /// Returns the ids that were torn down, in teardown order, with `id`
    /// last.  Returns an empty list if `id` is not activated.
    ///
    /// Fails with [`PluginError::MissingTeardown`] before any teardown runs if
    /// `id` or any plugin in its dependent closure has no teardown function.
    /// This includes dependents that are registered but not activated: they
    /// are skipped during teardown, yet still block the whole operation when
    /// they lack one.
    pub async fn deactivate_plugin(&self, id: &str) -> PluginResult<Vec<String>> {
        let jobs = self.plan_teardown(id)?;
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            plugin = %id,
            order  = ?jobs.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(),
            "Tearing down dependent closure"
        );

        let outcomes = future::join_all(jobs.into_iter().map(|job| {
            let manager = self.clone();
            async move {
                let result = (job.deactivate)(manager.clone(), job.services).await;
                manager.settle_teardown(job.id, result)
            }
        }))
        .await;

        let mut torn_down = Vec::new();
        let mut failures: Vec<(String, SharedError)> = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(id) => torn_down.push(id),
                Err(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            Ok(torn_down)
        } else {
            Err(PluginError::TeardownFailed { failures })
        }
    }

    /// Checks preconditions and snapshots everything teardown needs.
    fn plan_teardown(&self, id: &str) -> PluginResult<Vec<TeardownJob>> {
        let state = self.state();
        let registry = &state.registry;

        let target = registry
            .get(id)
            .ok_or_else(|| PluginError::NotRegistered(id.to_string()))?;
        if !target.activated {
            return Ok(Vec::new());
        }
        if target.deactivate.is_none() {
            return Err(PluginError::MissingTeardown {
                id: id.to_string(),
                relation: TeardownRelation::Target,
            });
        }

        let include_optional = self.options().closure_edges == ClosureEdges::All;
        let order = registry
            .dependency_graph(include_optional)
            .teardown_order(&id.to_string())
            .map_err(|cycle| PluginError::CycleDetected {
                id: id.to_string(),
                chain: cycle.path,
            })?;

        let mut jobs = Vec::with_capacity(order.len());
        for member in order {
            let Some(record) = registry.get(&member) else { continue };
            let Some(deactivate) = record.deactivate.clone() else {
                return Err(PluginError::MissingTeardown {
                    id: member,
                    relation: TeardownRelation::DependsOn(id.to_string()),
                });
            };
            if !record.activated {
                debug!(plugin = %member, "Skipping inactive dependent");
                continue;
            }
            let services = ResolvedServices::new(
                record
                    .dependencies()
                    .map(|token| (token.clone(), registry.current_service(token)))
                    .collect(),
            );
            jobs.push(TeardownJob {
                id: member,
                deactivate,
                services,
            });
        }
        Ok(jobs)
    }

    /// Records the outcome of one teardown.  Only success clears the plugin.
    fn settle_teardown(
        &self,
        id: String,
        result: Result<(), kiln_core::BoxError>,
    ) -> Result<String, (String, SharedError)> {
        match result {
            Ok(()) => {
                if let Some(record) = self.state().registry.get_mut(&id) {
                    record.mark_deactivated();
                }
                info!(plugin = %id, "Plugin deactivated");
                Ok(id)
            }
            Err(e) => {
                error!(plugin = %id, error = %e, "Plugin teardown failed");
                Err((id, share_error(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kiln_core::{BoxError, Token};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::plugin::PluginDescriptor;

    fn teardown_ok(
        _: PluginManager,
        _: ResolvedServices,
    ) -> futures::future::Ready<Result<(), BoxError>> {
        futures::future::ready(Ok(()))
    }

    #[tokio::test]
    async fn test_inactive_target_is_noop() {
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("idle").deactivate(teardown_ok)));

        let torn_down = assert_ok!(manager.deactivate_plugin("idle").await);
        assert!(torn_down.is_empty());

        let err = assert_err!(manager.deactivate_plugin("ghost").await);
        assert!(matches!(err, PluginError::NotRegistered(_)));
    }

    #[tokio::test]
    async fn test_target_without_teardown() {
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("sticky").build()));
        assert_ok!(manager.activate_plugin("sticky").await);

        let err = assert_err!(manager.deactivate_plugin("sticky").await);
        assert!(matches!(
            err,
            PluginError::MissingTeardown { ref id, relation: TeardownRelation::Target } if id == "sticky"
        ));
        assert!(manager.is_plugin_activated("sticky"));
    }

    #[tokio::test]
    async fn test_inactive_dependent_without_teardown_blocks() {
        let core: Token<u8> = Token::new("core");
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("core")
                .provides(&core, |_, _| async { Ok::<_, BoxError>(Arc::new(1u8)) })
                .deactivate(teardown_ok)
        ));
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("dormant").requires(&core)));
        assert_ok!(manager.activate_plugin("core").await);

        let err = assert_err!(manager.deactivate_plugin("core").await);
        assert!(matches!(
            err,
            PluginError::MissingTeardown { ref id, relation: TeardownRelation::DependsOn(ref on) }
                if id == "dormant" && on == "core"
        ));
        assert!(manager.is_plugin_activated("core"));
        assert!(!manager.is_plugin_activated("dormant"));
    }

    #[tokio::test]
    async fn test_required_only_closure_spares_optional_dependents() {
        let core: Token<u8> = Token::new("core");
        let manager = PluginManager::with_options(crate::ManagerOptions {
            closure_edges: ClosureEdges::RequiredOnly,
        });
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("core")
                .provides(&core, |_, _| async { Ok::<_, BoxError>(Arc::new(1u8)) })
                .deactivate(teardown_ok)
        ));
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("needs")
                .requires(&core)
                .deactivate(teardown_ok)
        ));
        assert_ok!(manager.register_plugin(PluginDescriptor::builder("likes").optional(&core)));

        let _ = manager.activate_plugins(["needs", "likes"]).await;
        let torn_down = assert_ok!(manager.deactivate_plugin("core").await);

        assert_eq!(torn_down, vec!["needs", "core"]);
        assert!(manager.is_plugin_activated("likes"));
    }

    #[tokio::test]
    async fn test_failed_teardown_keeps_plugin_active() {
        let base: Token<u8> = Token::new("base");
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("base")
                .provides(&base, |_, _| async { Ok::<_, BoxError>(Arc::new(0u8)) })
                .deactivate(teardown_ok)
        ));
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("stubborn")
                .requires(&base)
                .deactivate(|_, _| async { Err::<(), BoxError>("refusing".into()) })
        ));
        assert_ok!(manager.activate_plugin("stubborn").await);

        let err = assert_err!(manager.deactivate_plugin("base").await);
        assert_eq!(err.failed_plugins(), vec!["stubborn"]);

        // Siblings still settle; only the failing plugin keeps its state.
        assert!(manager.is_plugin_activated("stubborn"));
        assert!(!manager.is_plugin_activated("base"));
    }

    #[tokio::test]
    async fn test_teardown_receives_current_services() {
        let value: Token<u32> = Token::new("value");
        let wanted = value.clone();
        let manager = PluginManager::new();
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("source")
                .provides(&value, |_, _| async { Ok::<_, BoxError>(Arc::new(42u32)) })
                .deactivate(teardown_ok)
        ));
        assert_ok!(manager.register_plugin(
            PluginDescriptor::builder("reader")
                .requires(&value)
                .deactivate(move |_, services| {
                    let seen = services.get(&wanted).map(|v| *v);
                    async move {
                        assert_eq!(seen, Some(42));
                        Ok::<_, BoxError>(())
                    }
                })
        ));
        assert_ok!(manager.activate_plugin("reader").await);

        let torn_down = assert_ok!(manager.deactivate_plugin("source").await);
        assert_eq!(torn_down, vec!["reader", "source"]);
    }
}

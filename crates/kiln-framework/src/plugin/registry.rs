//! Plugin registry: id → record and token → provider id.
//!
//! The registry is plain data guarded by the [`PluginManager`]'s lock; nothing
//! here awaits.  Registration runs the cycle guard against the graph as it
//! *would* look with the candidate admitted, so a rejected registration leaves
//! both maps untouched.
//!
//! [`PluginManager`]: crate::manager::PluginManager

use std::collections::HashMap;

use kiln_core::{AnyToken, DependencyGraph, ServiceArc};
use tracing::{debug, info, warn};

use super::core::{AutoStart, PluginRecord};
use super::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};

#[derive(Debug, Default)]
pub(crate) struct Registry {
    plugins: HashMap<String, PluginRecord>,
    /// Token → id of the plugin that provides it.  Entries may dangle after an
    /// unregistration; lookups treat a dangling entry as "no provider".
    services: HashMap<AnyToken, String>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // ─── Registration ────────────────────────────────────────────────────────

    pub(crate) fn register(&mut self, desc: PluginDescriptor) -> PluginResult<()> {
        if self.plugins.contains_key(&desc.id) {
            return Err(PluginError::DuplicateId(desc.id));
        }

        let record = PluginRecord::from_descriptor(desc);
        self.check_cycles(&record)?;

        if let Some(token) = &record.provides
            && let Some(prev) = self.services.insert(token.clone(), record.id.clone())
            && self.plugins.get(&prev).is_some_and(|r| r.provides_token(token))
        {
            warn!(
                service       = %token,
                prev_provider = %prev,
                new_provider  = %record.id,
                "Duplicate service provider, last registration wins"
            );
        }

        info!(plugin = %record.id, "Plugin registered");
        self.plugins.insert(record.id.clone(), record);
        Ok(())
    }

    /// Removes a plugin.  Returns `false` if it was not registered.
    pub(crate) fn unregister(&mut self, id: &str, force: bool) -> PluginResult<bool> {
        let Some(record) = self.plugins.get(id) else {
            return Ok(false);
        };
        if record.activated && !force {
            return Err(PluginError::StillActive(id.to_string()));
        }
        if record.activated {
            warn!(plugin = %id, "Forcing removal of an active plugin");
        }
        self.plugins.remove(id);
        info!(plugin = %id, "Plugin unregistered");
        Ok(true)
    }

    // ─── Cycle guard ─────────────────────────────────────────────────────────

    /// Rejects `candidate` if admitting it would close a dependency cycle.
    ///
    /// Edges run from a dependent to the provider of each of its tokens, using
    /// the service map as it would be after registration.  Providers without
    /// dependencies cannot sit on a cycle and contribute no edges.
    fn check_cycles(&self, candidate: &PluginRecord) -> PluginResult<()> {
        if candidate.provides.is_none() || !candidate.has_dependencies() {
            return Ok(());
        }

        let lookup = |id: &str| -> Option<&PluginRecord> {
            if id == candidate.id {
                Some(candidate)
            } else {
                self.plugins.get(id)
            }
        };
        let provider_of = |token: &AnyToken| -> Option<&PluginRecord> {
            if candidate.provides.as_ref() == Some(token) {
                return Some(candidate);
            }
            self.services
                .get(token)
                .and_then(|id| lookup(id))
                .filter(|r| r.provides_token(token))
        };

        let mut graph = DependencyGraph::new();
        let mut ids: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids.push(&candidate.id);

        for id in ids {
            let Some(dependent) = lookup(id) else { continue };
            for token in dependent.dependencies() {
                if let Some(provider) = provider_of(token)
                    && provider.has_dependencies()
                {
                    graph.add_edge(dependent.id.clone(), provider.id.clone());
                }
            }
        }

        match graph.topological_order() {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let chain = rotate_to(cycle.path, &candidate.id);
                warn!(
                    plugin = %candidate.id,
                    chain  = %chain.join(" -> "),
                    "Registration rejected: dependency cycle"
                );
                Err(PluginError::CycleDetected {
                    id: candidate.id.clone(),
                    chain,
                })
            }
        }
    }

    // ─── Lookups ─────────────────────────────────────────────────────────────

    pub(crate) fn has(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub(crate) fn is_activated(&self, id: &str) -> bool {
        self.plugins.get(id).is_some_and(|r| r.activated)
    }

    /// Registered ids, sorted.
    pub(crate) fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn ids_with(&self, auto_start: AutoStart) -> Vec<String> {
        let mut ids: Vec<String> = self
            .plugins
            .values()
            .filter(|r| r.auto_start == auto_start)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn get(&self, id: &str) -> Option<&PluginRecord> {
        self.plugins.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut PluginRecord> {
        self.plugins.get_mut(id)
    }

    /// The live provider of `token`.
    ///
    /// An entry is dangling once its provider is unregistered, even if a
    /// later plugin reuses the id; dangling entries resolve to `None`.
    pub(crate) fn provider_of(&self, token: &AnyToken) -> Option<&PluginRecord> {
        let id = self.services.get(token)?;
        let provider = self.plugins.get(id).filter(|r| r.provides_token(token));
        if provider.is_none() {
            debug!(service = %token, provider = %id, "Service map entry is dangling");
        }
        provider
    }

    /// Current service for `token`, if its provider is registered and active.
    pub(crate) fn current_service(&self, token: &AnyToken) -> Option<ServiceArc> {
        self.provider_of(token).and_then(|p| p.service.clone())
    }

    /// Dependent → provider graph over every live plugin.
    ///
    /// With `include_optional` unset, optional dependencies contribute no
    /// edges.
    pub(crate) fn dependency_graph(&self, include_optional: bool) -> DependencyGraph<String> {
        let mut graph = DependencyGraph::new();
        for id in self.list() {
            let Some(record) = self.plugins.get(&id) else { continue };
            graph.add_node(id.clone());
            let tokens: Box<dyn Iterator<Item = &AnyToken>> = if include_optional {
                Box::new(record.dependencies())
            } else {
                Box::new(record.requires.iter())
            };
            for token in tokens {
                if let Some(provider) = self.provider_of(token) {
                    graph.add_edge(id.clone(), provider.id.clone());
                }
            }
        }
        graph
    }
}

/// Rotates a closed cycle path so that it starts and ends at `start`.
fn rotate_to(mut path: Vec<String>, start: &str) -> Vec<String> {
    path.pop();
    if let Some(pos) = path.iter().position(|id| id == start) {
        path.rotate_left(pos);
    }
    if let Some(first) = path.first().cloned() {
        path.push(first);
    }
    path
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kiln_core::{BoxError, Token};

    use super::*;
    use crate::plugin::{NoService, PluginBuilder, ProvidesService};

    fn unit(id: &str) -> PluginBuilder<NoService> {
        PluginDescriptor::builder(id)
    }

    fn provider(id: &str, token: &Token<u32>) -> PluginBuilder<ProvidesService> {
        PluginDescriptor::builder(id).provides(token, |_, _| async {
            Ok::<_, BoxError>(Arc::new(0u32))
        })
    }

    #[test]
    fn test_duplicate_id() {
        let mut registry = Registry::new();
        registry.register(unit("a").build()).unwrap();

        let err = registry.register(unit("a").build()).unwrap_err();
        assert!(matches!(err, PluginError::DuplicateId(id) if id == "a"));
        assert_eq!(registry.list(), vec!["a"]);
    }

    #[test]
    fn test_cycle_rejected_without_side_effects() {
        let ta: Token<u32> = Token::new("a");
        let tb: Token<u32> = Token::new("b");
        let tc: Token<u32> = Token::new("c");

        let mut registry = Registry::new();
        registry
            .register(provider("a", &ta).requires(&tc).build())
            .unwrap();
        registry
            .register(provider("b", &tb).requires(&ta).build())
            .unwrap();

        let err = registry
            .register(provider("c", &tc).optional(&tb).build())
            .unwrap_err();
        match err {
            PluginError::CycleDetected { id, chain } => {
                assert_eq!(id, "c");
                assert_eq!(chain, vec!["c", "b", "a", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(!registry.has("c"));
        assert!(registry.provider_of(&tc.erase()).is_none());
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let t: Token<u32> = Token::new("t");
        let mut registry = Registry::new();

        let err = registry
            .register(provider("self", &t).requires(&t).build())
            .unwrap_err();
        assert!(matches!(err, PluginError::CycleDetected { chain, .. } if chain == ["self", "self"]));
    }

    #[test]
    fn test_dependency_free_provider_closes_nothing() {
        let ta: Token<u32> = Token::new("a");
        let tb: Token<u32> = Token::new("b");
        let mut registry = Registry::new();

        // `a` is registered before anything provides `b`, so no cycle yet.
        registry
            .register(provider("a", &ta).requires(&tb).build())
            .unwrap();
        registry.register(provider("b", &tb).build()).unwrap();
        registry
            .register(unit("consumer").requires(&ta).requires(&tb).build())
            .unwrap();

        assert_eq!(registry.list(), vec!["a", "b", "consumer"]);
    }

    #[test]
    fn test_last_provider_wins() {
        let t: Token<u32> = Token::new("t");
        let mut registry = Registry::new();
        registry.register(provider("first", &t).build()).unwrap();
        registry.register(provider("second", &t).build()).unwrap();

        assert_eq!(registry.provider_of(&t.erase()).unwrap().id, "second");
    }

    #[test]
    fn test_unregister_leaves_dangling_entry() {
        let t: Token<u32> = Token::new("t");
        let mut registry = Registry::new();
        registry.register(provider("p", &t).build()).unwrap();

        assert!(registry.unregister("p", false).unwrap());
        assert!(!registry.unregister("p", false).unwrap());
        assert!(registry.provider_of(&t.erase()).is_none());
        assert!(registry.current_service(&t.erase()).is_none());
    }

    #[test]
    fn test_reused_id_does_not_revive_dangling_entry() {
        let t: Token<u32> = Token::new("t");
        let mut registry = Registry::new();
        registry.register(provider("p", &t).build()).unwrap();
        registry.unregister("p", false).unwrap();
        registry.register(unit("p").build()).unwrap();

        assert!(registry.provider_of(&t.erase()).is_none());
        assert!(registry.current_service(&t.erase()).is_none());
    }

    #[test]
    fn test_reused_id_cannot_close_cycle_through_dangling_entry() {
        let tx: Token<u32> = Token::new("tx");
        let tq: Token<u32> = Token::new("tq");
        let mut registry = Registry::new();
        registry.register(provider("p", &tx).build()).unwrap();
        registry
            .register(provider("q", &tq).requires(&tx).build())
            .unwrap();
        registry.unregister("p", false).unwrap();

        // `q` no longer has a provider for `tx`, so there is no edge back.
        registry.register(unit("p").requires(&tq).build()).unwrap();

        let graph = registry.dependency_graph(true);
        let edges: Vec<(String, String)> = graph
            .edges()
            .map(|(d, p)| (d.clone(), p.clone()))
            .collect();
        assert_eq!(edges, vec![("p".to_string(), "q".to_string())]);
        assert!(graph.topological_order().is_ok());
    }

    #[test]
    fn test_unregister_active_requires_force() {
        let mut registry = Registry::new();
        registry.register(unit("a").build()).unwrap();
        registry
            .get_mut("a")
            .unwrap()
            .mark_activated(Arc::new(()));

        let err = registry.unregister("a", false).unwrap_err();
        assert!(matches!(err, PluginError::StillActive(_)));
        assert!(registry.unregister("a", true).unwrap());
        assert!(!registry.has("a"));
    }

    #[test]
    fn test_dependency_graph_required_only() {
        let ta: Token<u32> = Token::new("a");
        let tb: Token<u32> = Token::new("b");
        let mut registry = Registry::new();
        registry.register(provider("a", &ta).build()).unwrap();
        registry.register(provider("b", &tb).build()).unwrap();
        registry
            .register(unit("c").requires(&ta).optional(&tb).build())
            .unwrap();

        let all: Vec<(String, String)> = registry
            .dependency_graph(true)
            .edges()
            .map(|(d, p)| (d.clone(), p.clone()))
            .collect();
        let required: Vec<(String, String)> = registry
            .dependency_graph(false)
            .edges()
            .map(|(d, p)| (d.clone(), p.clone()))
            .collect();

        assert_eq!(all.len(), 2);
        assert_eq!(required, vec![("c".to_string(), "a".to_string())]);
    }
}

//! [`ResolvedServices`]: the argument list handed to activate and deactivate.

use std::sync::Arc;

use kiln_core::{AnyToken, ServiceArc, Token};

use crate::error::{PluginError, PluginResult};

/// Ordered dependency values for one plugin.
///
/// Entries follow the plugin's declaration: every required token first, then
/// every optional token, each group in declared order.  A `None` value is the
/// "no service" marker: an optional dependency without a working provider, or
/// (during teardown) a provider that has since gone away.
///
/// # Example
///
/// ```rust,ignore
/// PluginDescriptor::builder("status-bar")
///     .requires(&CLOCK)
///     .optional(&THEME)
///     .activate(|_ctx, services| async move {
///         let clock = services.require(&CLOCK)?;
///         let theme = services.get(&THEME);   // Option<Arc<dyn Theme>>
///         // …
///         Ok(())
///     })
/// ```
#[derive(Clone, Default)]
pub struct ResolvedServices {
    entries: Vec<(AnyToken, Option<ServiceArc>)>,
}

impl ResolvedServices {
    pub(crate) fn new(entries: Vec<(AnyToken, Option<ServiceArc>)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The type-erased value at `index`, or `None` for the "no service" marker
    /// and for out-of-range indices.
    pub fn at(&self, index: usize) -> Option<&ServiceArc> {
        self.entries.get(index).and_then(|(_, svc)| svc.as_ref())
    }

    /// Tokens in argument order.
    pub fn tokens(&self) -> impl Iterator<Item = &AnyToken> {
        self.entries.iter().map(|(token, _)| token)
    }

    /// Returns `true` if `token` is in the list and has a service.
    pub fn is_present<T: ?Sized>(&self, token: &Token<T>) -> bool {
        self.entries
            .iter()
            .any(|(t, svc)| token == t && svc.is_some())
    }

    /// Typed lookup.  `None` if the token is absent, marked "no service", or
    /// stored under another type.
    pub fn get<T>(&self, token: &Token<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .iter()
            .find(|(t, _)| token == t)
            .and_then(|(_, svc)| svc.as_ref())
            .and_then(|svc| token.downcast(svc))
    }

    /// Typed lookup that fails loudly.
    ///
    /// Returns [`PluginError::NoProvider`] when the value is missing and
    /// [`PluginError::ServiceTypeMismatch`] when it has the wrong type.
    pub fn require<T>(&self, token: &Token<T>) -> PluginResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let svc = self
            .entries
            .iter()
            .find(|(t, _)| token == t)
            .and_then(|(_, svc)| svc.as_ref())
            .ok_or_else(|| PluginError::NoProvider {
                token: token.name().to_string(),
            })?;
        token
            .downcast(svc)
            .ok_or_else(|| PluginError::ServiceTypeMismatch {
                token: token.name().to_string(),
            })
    }
}

impl std::fmt::Debug for ResolvedServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|(token, svc)| (token.name(), svc.is_some())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_identity() {
        let first: Token<u32> = Token::new("n");
        let second: Token<u32> = Token::new("n");
        let services = ResolvedServices::new(vec![
            (first.erase(), Some(first.wrap(Arc::new(1)))),
            (second.erase(), Some(second.wrap(Arc::new(2)))),
        ]);

        assert_eq!(*services.get(&first).unwrap(), 1);
        assert_eq!(*services.get(&second).unwrap(), 2);
    }

    #[test]
    fn test_no_service_marker() {
        let token: Token<String> = Token::new("absent");
        let services = ResolvedServices::new(vec![(token.erase(), None)]);

        assert_eq!(services.len(), 1);
        assert!(services.at(0).is_none());
        assert!(!services.is_present(&token));
        assert!(services.get(&token).is_none());
        assert!(matches!(
            services.require(&token),
            Err(PluginError::NoProvider { token }) if token == "absent"
        ));
    }

    #[test]
    fn test_require_type_mismatch() {
        let stored_as: Token<u32> = Token::new("value");
        let lying: Token<String> = Token::new("value");
        let services = ResolvedServices::new(vec![(
            lying.erase(),
            Some(stored_as.wrap(Arc::new(5))),
        )]);

        assert!(matches!(
            services.require(&lying),
            Err(PluginError::ServiceTypeMismatch { .. })
        ));
    }
}

//! Service tokens: typed identity keys for inter-plugin services.
//!
//! A [`Token<T>`] names a service contract.  Plugins declare the tokens they
//! require and the token they provide; the container matches them by
//! **identity**, never by name:
//!
//! ```rust,ignore
//! pub trait Clock: Send + Sync { fn now(&self) -> u64; }
//!
//! static CLOCK: LazyLock<Token<dyn Clock>> = LazyLock::new(|| Token::new("app.clock"));
//! ```
//!
//! Two tokens created with the same name are still two different tokens.
//! Cloning a token keeps its identity.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased service value as stored by the container.
///
/// The inner `dyn Any` is always an `Arc<T>` for the `T` of the token the
/// service was registered under, so trait-object services round-trip through
/// [`Token::downcast`].
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

// ─── TokenId ──────────────────────────────────────────────────────────────────

/// Process-unique identity of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    fn next() -> Self {
        Self(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for diagnostics.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── AnyToken ─────────────────────────────────────────────────────────────────

/// The type-erased form of a [`Token`].
///
/// This is what plugin declarations and the service map hold.  Equality and
/// hashing only look at the [`TokenId`].
#[derive(Clone)]
pub struct AnyToken {
    id: TokenId,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
}

impl AnyToken {
    pub fn id(&self) -> TokenId {
        self.id
    }

    /// Display name used in logs and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for AnyToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyToken {}

impl Hash for AnyToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyToken")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ─── Token<T> ─────────────────────────────────────────────────────────────────

/// A typed service token.
///
/// `T` is the service type resolved through this token and may be unsized
/// (`Token<dyn MyService>`).  The token itself never holds a value.
pub struct Token<T: ?Sized> {
    erased: AnyToken,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Token<T> {
    /// Creates a new token with a fresh identity.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            erased: AnyToken {
                id: TokenId::next(),
                name: name.into(),
                description: None,
            },
            _marker: PhantomData,
        }
    }

    /// Attaches a human-readable description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.erased.description = Some(description.into());
        self
    }

    /// Wraps a concrete service so it can be stored under this token.
    pub fn wrap(&self, service: Arc<T>) -> ServiceArc {
        Arc::new(service)
    }

    /// Recovers the typed service from a stored value.
    ///
    /// Returns `None` if the value was stored under a different type.
    pub fn downcast(&self, service: &ServiceArc) -> Option<Arc<T>> {
        service.downcast_ref::<Arc<T>>().cloned()
    }
}

impl<T: ?Sized> Token<T> {
    pub fn id(&self) -> TokenId {
        self.erased.id
    }

    pub fn name(&self) -> &str {
        self.erased.name()
    }

    pub fn description(&self) -> Option<&str> {
        self.erased.description()
    }

    /// Returns the type-erased form of this token.
    pub fn erase(&self) -> AnyToken {
        self.erased.clone()
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.erased == other.erased
    }
}

impl<T: ?Sized> Eq for Token<T> {}

impl<T: ?Sized> PartialEq<AnyToken> for Token<T> {
    fn eq(&self, other: &AnyToken) -> bool {
        self.erased == *other
    }
}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.erased.id)
            .field("name", &self.erased.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: ?Sized> From<&Token<T>> for AnyToken {
    fn from(token: &Token<T>) -> Self {
        token.erase()
    }
}

//! Core identity types for the fetchloom engine.
//!
//! This module defines the fundamental types used to address fetched data:
//!
//! - [`RequestKey`]: a type-erased, hashable wrapper around a user request value
//! - [`RequestIdentity`]: the cache key, pairing a data-source name with a request
//! - [`CachedValue`]: the erased storage form of a data-source response
//!
//! Requests belonging to different data sources can carry different concrete
//! types, so the engine erases them behind [`RequestKey`]. Equality and
//! hashing are forwarded to the underlying value; two keys wrapping values of
//! different concrete types are never equal. Downcasting back to the concrete
//! request type happens only in code paths parameterized by the owning data
//! source, which is what keeps the erased storage sound: a value is only ever
//! read back in the same typed context that wrote it.
//!
//! # Examples
//!
//! ```rust
//! use fetchloom::types::{RequestIdentity, RequestKey};
//!
//! let a = RequestKey::new(42u32);
//! let b = RequestKey::new(42u32);
//! let c = RequestKey::new("42".to_string());
//!
//! assert_eq!(a, b);
//! assert_ne!(a, c); // different concrete types never compare equal
//!
//! let id = RequestIdentity::new("ArticleSource", 42u32);
//! assert_eq!(id.source(), "ArticleSource");
//! ```

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// The erased storage form of a data-source response.
///
/// Responses are stored behind `Arc` so cache snapshots are shallow clones.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Object-safe view of a request value: dynamic equality, hashing, and
/// debug rendering over an erased concrete type.
///
/// A blanket implementation covers every type that satisfies the request
/// bounds, so user code never implements this trait by hand.
pub trait FetchKey: fmt::Debug + Send + Sync + 'static {
    /// Compare against another erased key; `false` when the concrete types differ.
    fn eq_key(&self, other: &dyn FetchKey) -> bool;
    /// Feed the underlying value into a hasher.
    fn hash_key(&self, state: &mut dyn Hasher);
    /// Access the underlying value for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> FetchKey for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn eq_key(&self, other: &dyn FetchKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| other == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A type-erased request value usable as a map key.
///
/// Wraps any `Eq + Hash + Debug + Send + Sync + 'static` value. Cloning is
/// cheap (shared `Arc`).
#[derive(Clone)]
pub struct RequestKey(Arc<dyn FetchKey>);

impl RequestKey {
    /// Erase a concrete request value.
    pub fn new<R: FetchKey>(request: R) -> Self {
        Self(Arc::new(request))
    }

    /// Recover the concrete request, if this key wraps a value of type `R`.
    pub fn downcast_ref<R: 'static>(&self) -> Option<&R> {
        self.0.as_any().downcast_ref()
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_key(other.0.as_ref())
    }
}

impl Eq for RequestKey {}

impl Hash for RequestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_key(state);
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The cache key: a data-source name paired with a request value.
///
/// Two identities are equal exactly when both the source name and the
/// underlying request compare equal. Equal requests against the same source
/// therefore address the same cached response, which is what makes
/// deduplication and cross-round memoization behavior-preserving.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    source: String,
    request: RequestKey,
}

impl RequestIdentity {
    /// Build an identity from a source name and a concrete request value.
    pub fn new<R: FetchKey>(source: impl Into<String>, request: R) -> Self {
        Self {
            source: source.into(),
            request: RequestKey::new(request),
        }
    }

    /// Build an identity from a source name and an already-erased key.
    pub(crate) fn from_key(source: &str, request: RequestKey) -> Self {
        Self {
            source: source.to_string(),
            request,
        }
    }

    /// The owning data source's stable name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The erased request value.
    #[must_use]
    pub fn request(&self) -> &RequestKey {
        &self.request
    }
}

/// One-shot result slot shared between a pending request and the
/// continuation that will consume its response.
///
/// The executor fills the slot after a round settles; the continuation reads
/// it back in the typed context that created it. Filled at most once.
#[derive(Clone)]
pub(crate) struct ValueSlot(Arc<OnceLock<CachedValue>>);

impl ValueSlot {
    pub(crate) fn empty() -> Self {
        Self(Arc::new(OnceLock::new()))
    }

    pub(crate) fn fill(&self, value: CachedValue) {
        let _ = self.0.set(value);
    }

    pub(crate) fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.0
            .get()
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}

//! Content-addressed request cache with pure update semantics.
//!
//! [`RequestCache`] maps a [`RequestIdentity`] — the pair of a data-source
//! name and a request value — to the response fetched for it. Every update
//! produces a new logical cache value; the original is untouched. Values are
//! held behind `Arc`, so the per-update clone copies the index, not the
//! cached data.
//!
//! The executor owns the cache for the duration of a run and is the only
//! writer. Callers can seed a run with a pre-filled cache and keep the final
//! cache for a later run; a run whose every identity is already present
//! performs zero data-source calls.
//!
//! Type safety is preserved by construction: the typed accessors
//! ([`get`](RequestCache::get), [`insert`](RequestCache::insert),
//! [`cache_results`](RequestCache::cache_results)) are parameterized by the
//! owning [`DataSource`], and only that source's identities can address the
//! values they store, so a lookup always downcasts to the type that was
//! inserted.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::source::DataSource;
use crate::types::{CachedValue, RequestIdentity};

/// Logical mapping from request identity to fetched response.
///
/// Cloning is shallow; updates are pure (they return a new cache).
#[derive(Clone, Default)]
pub struct RequestCache {
    entries: FxHashMap<RequestIdentity, CachedValue>,
}

impl RequestCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache pre-filled with responses for one data source.
    pub fn from_entries<S, I>(source: &S, entries: I) -> Self
    where
        S: DataSource,
        I: IntoIterator<Item = (S::Request, S::Response)>,
    {
        Self::new().cache_results(source, entries)
    }

    /// Number of cached identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when `identity` has a cached response.
    #[must_use]
    pub fn contains(&self, identity: &RequestIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// The erased response for `identity`, if present.
    #[must_use]
    pub fn lookup(&self, identity: &RequestIdentity) -> Option<CachedValue> {
        self.entries.get(identity).cloned()
    }

    /// The typed response cached for `request` against `source`.
    #[must_use]
    pub fn get<S: DataSource>(&self, source: &S, request: &S::Request) -> Option<S::Response> {
        self.lookup(&source.identity(request))
            .and_then(|value| value.downcast_ref::<S::Response>().cloned())
    }

    /// A new cache with `identity` mapped to `value`. Unrelated entries are
    /// untouched; an existing entry for `identity` is replaced.
    #[must_use]
    pub fn updated(&self, identity: RequestIdentity, value: CachedValue) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(identity, value);
        Self { entries }
    }

    /// A new cache with one typed response added for `source`.
    #[must_use]
    pub fn insert<S: DataSource>(
        &self,
        source: &S,
        request: &S::Request,
        response: S::Response,
    ) -> Self {
        self.updated(source.identity(request), Arc::new(response))
    }

    /// A new cache with a batch of responses merged in for `source`.
    #[must_use]
    pub fn cache_results<S, I>(&self, source: &S, results: I) -> Self
    where
        S: DataSource,
        I: IntoIterator<Item = (S::Request, S::Response)>,
    {
        let mut entries = self.entries.clone();
        for (request, response) in results {
            entries.insert(source.identity(&request), Arc::new(response));
        }
        Self { entries }
    }

    /// A new cache with a batch of erased commits merged in. Executor-side
    /// counterpart of [`cache_results`](Self::cache_results).
    pub(crate) fn committed(
        &self,
        commits: impl IntoIterator<Item = (RequestIdentity, CachedValue)>,
    ) -> Self {
        let mut entries = self.entries.clone();
        for (identity, value) in commits {
            entries.insert(identity, value);
        }
        Self { entries }
    }

    /// Iterate the cached identities (order unspecified).
    pub fn identities(&self) -> impl Iterator<Item = &RequestIdentity> {
        self.entries.keys()
    }
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("len", &self.entries.len())
            .field("identities", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

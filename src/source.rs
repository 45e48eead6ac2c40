//! The data-source contract.
//!
//! A [`DataSource`] is a capability object that knows how to resolve a batch
//! of requests against one backend (a database table, an HTTP endpoint, a
//! key-value namespace). The engine never talks to backends directly; it
//! hands each data source the distinct, uncached requests that accumulated
//! for it in the current round and expects a response map back.
//!
//! # Contract
//!
//! - [`name`](DataSource::name) is a stable string, unique per data source.
//!   It is half of every cache key and the fusion key for batching: blocked
//!   requests targeting the same name are issued as one batch.
//! - [`fetch`](DataSource::fetch) always receives a **distinct, non-empty**
//!   request list. The returned map may omit a requested key — the executor
//!   treats that as "not found" and fails the run — but must not invent keys
//!   that were never requested (extras are discarded with a warning).
//! - `fetch` must not cache internally (the engine owns memoization) and
//!   must be safe to invoke concurrently with other data sources.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use fetchloom::errors::FetchError;
//! use fetchloom::source::DataSource;
//! use rustc_hash::FxHashMap;
//!
//! #[derive(Clone, Debug, PartialEq, Eq)]
//! struct User {
//!     id: u64,
//!     login: String,
//! }
//!
//! struct UserSource;
//!
//! #[async_trait]
//! impl DataSource for UserSource {
//!     type Request = u64;
//!     type Response = User;
//!
//!     fn name(&self) -> &str {
//!         "UserSource"
//!     }
//!
//!     async fn fetch(
//!         &self,
//!         requests: Vec<u64>,
//!     ) -> Result<FxHashMap<u64, User>, FetchError> {
//!         Ok(requests
//!             .into_iter()
//!             .map(|id| {
//!                 (
//!                     id,
//!                     User {
//!                         id,
//!                         login: format!("user-{id}"),
//!                     },
//!                 )
//!             })
//!             .collect())
//!     }
//! }
//! ```

use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::errors::FetchError;
use crate::types::RequestIdentity;

/// A batched, memoizable backend capability.
///
/// Implementations should be stateless with respect to request resolution:
/// equal requests must map to the same response for the lifetime of a run,
/// since the engine deduplicates and caches by request value.
///
/// Failures are reported through the single open error kind, [`FetchError`];
/// the engine wraps them with the source name and the round history before
/// surfacing them to the caller.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// One unit of data to fetch. Compared and cached by value.
    type Request: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The value resolved for a request. Stored as-is in the cache.
    type Response: Clone + Send + Sync + 'static;

    /// Stable identifier for this data source, unique across the sources
    /// used in one run. Used for cache keys and batch fusion.
    fn name(&self) -> &str;

    /// The cache key for a request against this source.
    fn identity(&self, request: &Self::Request) -> RequestIdentity {
        RequestIdentity::new(self.name(), request.clone())
    }

    /// Resolve a batch of requests.
    ///
    /// `requests` is distinct and non-empty. The returned map may be a
    /// subset of the requests (missing keys fail the run as not-found) but
    /// must not contain unrequested keys.
    async fn fetch(
        &self,
        requests: Vec<Self::Request>,
    ) -> Result<FxHashMap<Self::Request, Self::Response>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSource;

    #[async_trait]
    impl DataSource for EchoSource {
        type Request = String;
        type Response = String;

        fn name(&self) -> &str {
            "EchoSource"
        }

        async fn fetch(
            &self,
            requests: Vec<String>,
        ) -> Result<FxHashMap<String, String>, FetchError> {
            Ok(requests
                .into_iter()
                .map(|r| (r.clone(), r.to_uppercase()))
                .collect())
        }
    }

    #[test]
    fn identity_uses_the_source_name() {
        let source = EchoSource;
        let identity = source.identity(&"hello".to_string());
        assert_eq!(identity.source(), "EchoSource");
        assert_eq!(
            identity.request().downcast_ref::<String>(),
            Some(&"hello".to_string())
        );
    }

    #[tokio::test]
    async fn fetch_maps_every_request() {
        let source = EchoSource;
        let result = source
            .fetch(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("a"), Some(&"A".to_string()));
        assert_eq!(result.get("b"), Some(&"B".to_string()));
    }
}

//! The fetch description: a pure, composable value describing a
//! data-dependent computation without performing it.
//!
//! A [`Fetch<A>`] is one of three things: a ready value, a terminal error,
//! or a *blocked* computation — a frontier of outstanding requests plus a
//! continuation to resume once they resolve. Constructing and combining
//! descriptions performs **zero** data-source calls; only the runners in
//! [`crate::runner`] execute them.
//!
//! # Batching model
//!
//! The frontier of a blocked description is pre-grouped by data-source name
//! at construction time. [`join`](Fetch::join), [`collect`], and
//! [`traverse`] merge the frontiers of independent descriptions, fusing
//! sibling groups that target the same source — that is what turns N
//! independent `fetch_one` calls into one batch. [`flat_map`](Fetch::flat_map)
//! is the only sequencing barrier: everything inside its continuation runs
//! in rounds strictly after the producer's rounds.
//!
//! # Examples
//!
//! ```rust
//! use fetchloom::fetch::{collect, pure};
//! use fetchloom::runner::run;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let doubled = pure(21).map(|n| n * 2);
//! assert_eq!(run(doubled).await.unwrap(), 42);
//!
//! let all = collect(vec![pure(1), pure(2), pure(3)]);
//! assert_eq!(run(all).await.unwrap(), vec![1, 2, 3]);
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{FailureKind, FetchError};
use crate::source::DataSource;
use crate::types::{CachedValue, RequestIdentity, RequestKey, ValueSlot};

/// Deferred rest-of-computation, invoked once the current frontier's slots
/// are filled.
pub(crate) type Continuation<A> = Box<dyn FnOnce() -> Fetch<A> + Send>;

/// A pure description of a data-dependent computation.
///
/// Values of this type are inert: nothing happens until a runner executes
/// them. Running consumes the description; since construction is pure and
/// cheap, callers that need to re-run simply rebuild it (typically from a
/// closure) and reuse the cache returned by the previous run.
pub struct Fetch<A> {
    pub(crate) state: FetchState<A>,
}

pub(crate) enum FetchState<A> {
    /// A ready value.
    Done(A),
    /// A terminal failure.
    Fail(FailureKind),
    /// Outstanding requests plus the continuation to resume with.
    Blocked(Frontier, Continuation<A>),
}

/// The set of request groups a blocked description is waiting on, grouped
/// by data-source name at construction time.
pub(crate) struct Frontier {
    pub(crate) groups: Vec<SourceGroup>,
}

impl Frontier {
    pub(crate) fn single(runner: Arc<dyn BatchRunner>, pending: Vec<PendingRequest>) -> Self {
        Self {
            groups: vec![SourceGroup { runner, pending }],
        }
    }

    /// Merge another frontier into this one, fusing groups that target the
    /// same source name. Group order follows first appearance.
    pub(crate) fn merged(mut self, other: Frontier) -> Self {
        for group in other.groups {
            match self
                .groups
                .iter_mut()
                .find(|existing| existing.runner.source_name() == group.runner.source_name())
            {
                Some(existing) => existing.pending.extend(group.pending),
                None => self.groups.push(group),
            }
        }
        self
    }
}

/// All requests pending against one data source, in construction order,
/// duplicates included.
pub(crate) struct SourceGroup {
    pub(crate) runner: Arc<dyn BatchRunner>,
    pub(crate) pending: Vec<PendingRequest>,
}

/// One outstanding request and the slot its response will be written to.
#[derive(Clone)]
pub(crate) struct PendingRequest {
    pub(crate) key: RequestKey,
    pub(crate) slot: ValueSlot,
}

/// Executor-facing view of a data source with the request type erased.
///
/// `run_batch` receives the distinct, uncached keys for one group, invokes
/// the underlying source, enforces the response-map contract, and returns
/// the cache commits for the round.
#[async_trait]
pub(crate) trait BatchRunner: Send + Sync {
    fn source_name(&self) -> &str;

    async fn run_batch(
        &self,
        misses: Vec<RequestKey>,
    ) -> Result<Vec<(RequestIdentity, CachedValue)>, FailureKind>;
}

struct SourceBatch<S: DataSource> {
    source: Arc<S>,
}

#[async_trait]
impl<S: DataSource> BatchRunner for SourceBatch<S> {
    fn source_name(&self) -> &str {
        self.source.name()
    }

    async fn run_batch(
        &self,
        misses: Vec<RequestKey>,
    ) -> Result<Vec<(RequestIdentity, CachedValue)>, FailureKind> {
        let name = self.source.name();
        let mut requests = Vec::with_capacity(misses.len());
        for key in &misses {
            let request = key.downcast_ref::<S::Request>().cloned().ok_or_else(|| {
                FailureKind::Internal(format!(
                    "request key {key:?} does not belong to source `{name}`"
                ))
            })?;
            requests.push(request);
        }

        let mut results = self
            .source
            .fetch(requests.clone())
            .await
            .map_err(|error| FailureKind::Source {
                source_name: name.to_string(),
                error,
            })?;

        let mut commits = Vec::with_capacity(misses.len());
        let mut missing = Vec::new();
        for (key, request) in misses.iter().zip(requests.iter()) {
            match results.remove(request) {
                Some(response) => commits.push((
                    RequestIdentity::from_key(name, key.clone()),
                    Arc::new(response) as CachedValue,
                )),
                None => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(FailureKind::MissingIdentity {
                source_name: name.to_string(),
                missing,
            });
        }
        if !results.is_empty() {
            tracing::warn!(
                source = name,
                unrequested = results.len(),
                "data source returned keys it was not asked for; discarding"
            );
        }
        Ok(commits)
    }
}

/// A description that is already done.
pub fn pure<A>(value: A) -> Fetch<A> {
    Fetch {
        state: FetchState::Done(value),
    }
}

/// A description that fails with a domain error when run.
pub fn error<A, E: Into<FetchError>>(error: E) -> Fetch<A> {
    Fetch {
        state: FetchState::Fail(FailureKind::User(error.into())),
    }
}

/// One outstanding request against one data source.
///
/// The returned description is blocked on a single-request group; combining
/// it with siblings via `join`/`collect`/`traverse` fuses the groups so the
/// executor issues one batch per source per round.
pub fn fetch_one<S: DataSource>(source: &Arc<S>, request: S::Request) -> Fetch<S::Response> {
    let slot = ValueSlot::empty();
    let pending = PendingRequest {
        key: RequestKey::new(request),
        slot: slot.clone(),
    };
    let runner: Arc<dyn BatchRunner> = Arc::new(SourceBatch {
        source: Arc::clone(source),
    });
    let source_name = source.name().to_string();
    Fetch {
        state: FetchState::Blocked(
            Frontier::single(runner, vec![pending]),
            Box::new(move || match slot.get::<S::Response>() {
                Some(response) => pure(response),
                None => Fetch {
                    state: FetchState::Fail(FailureKind::Internal(format!(
                        "unfilled result slot for source `{source_name}`"
                    ))),
                },
            }),
        ),
    }
}

/// A list of requests against one data source, resolved as a single batch.
///
/// The response list preserves the input order, duplicates included;
/// duplicates are deduplicated on the wire by the executor.
pub fn fetch_all<S: DataSource>(
    source: &Arc<S>,
    requests: Vec<S::Request>,
) -> Fetch<Vec<S::Response>> {
    if requests.is_empty() {
        return pure(Vec::new());
    }
    let pending: Vec<PendingRequest> = requests
        .iter()
        .map(|request| PendingRequest {
            key: RequestKey::new(request.clone()),
            slot: ValueSlot::empty(),
        })
        .collect();
    let slots: Vec<ValueSlot> = pending.iter().map(|p| p.slot.clone()).collect();
    let runner: Arc<dyn BatchRunner> = Arc::new(SourceBatch {
        source: Arc::clone(source),
    });
    let source_name = source.name().to_string();
    Fetch {
        state: FetchState::Blocked(
            Frontier::single(runner, pending),
            Box::new(move || {
                let mut responses = Vec::with_capacity(slots.len());
                for slot in &slots {
                    match slot.get::<S::Response>() {
                        Some(response) => responses.push(response),
                        None => {
                            return Fetch {
                                state: FetchState::Fail(FailureKind::Internal(format!(
                                    "unfilled result slot for source `{source_name}`"
                                ))),
                            }
                        }
                    }
                }
                pure(responses)
            }),
        ),
    }
}

impl<A: Send + 'static> Fetch<A> {
    /// Apply a pure function to the eventual value. Never adds a round.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Fetch<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        match self.state {
            FetchState::Done(value) => pure(f(value)),
            FetchState::Fail(kind) => Fetch {
                state: FetchState::Fail(kind),
            },
            FetchState::Blocked(frontier, cont) => Fetch {
                state: FetchState::Blocked(frontier, Box::new(move || cont().map(f))),
            },
        }
    }

    /// Use the eventual value to decide the next description.
    ///
    /// This is the sequencing barrier: rounds produced by `self` happen
    /// strictly before any round produced by the continuation. It is also
    /// the only combinator that prevents batching across its boundary.
    #[must_use]
    pub fn flat_map<B, K>(self, k: K) -> Fetch<B>
    where
        B: Send + 'static,
        K: FnOnce(A) -> Fetch<B> + Send + 'static,
    {
        match self.state {
            FetchState::Done(value) => k(value),
            FetchState::Fail(kind) => Fetch {
                state: FetchState::Fail(kind),
            },
            FetchState::Blocked(frontier, cont) => Fetch {
                state: FetchState::Blocked(frontier, Box::new(move || cont().flat_map(k))),
            },
        }
    }

    /// Independent composition: run both descriptions, batching their
    /// frontiers together. Groups targeting the same source name fuse into
    /// one batch; groups for different sources fetch concurrently in the
    /// same round.
    #[must_use]
    pub fn join<B: Send + 'static>(self, other: Fetch<B>) -> Fetch<(A, B)> {
        match (self.state, other.state) {
            (FetchState::Done(a), FetchState::Done(b)) => pure((a, b)),
            (FetchState::Fail(kind), _) => Fetch {
                state: FetchState::Fail(kind),
            },
            (_, FetchState::Fail(kind)) => Fetch {
                state: FetchState::Fail(kind),
            },
            (FetchState::Done(a), FetchState::Blocked(frontier, cont)) => Fetch {
                state: FetchState::Blocked(frontier, Box::new(move || pure(a).join(cont()))),
            },
            (FetchState::Blocked(frontier, cont), FetchState::Done(b)) => Fetch {
                state: FetchState::Blocked(frontier, Box::new(move || cont().join(pure(b)))),
            },
            (FetchState::Blocked(fa, ca), FetchState::Blocked(fb, cb)) => Fetch {
                state: FetchState::Blocked(fa.merged(fb), Box::new(move || ca().join(cb()))),
            },
        }
    }

    /// Alias for [`join`](Self::join).
    #[must_use]
    pub fn product<B: Send + 'static>(self, other: Fetch<B>) -> Fetch<(A, B)> {
        self.join(other)
    }

    /// Combine two independent descriptions with a function. Equivalent to
    /// `self.join(other).map(...)`.
    #[must_use]
    pub fn map2<B, C, F>(self, other: Fetch<B>, f: F) -> Fetch<C>
    where
        B: Send + 'static,
        C: Send + 'static,
        F: FnOnce(A, B) -> C + Send + 'static,
    {
        self.join(other).map(move |(a, b)| f(a, b))
    }
}

/// N-ary `join`: run every description independently, returning the values
/// in input order.
pub fn collect<A: Send + 'static>(fetches: Vec<Fetch<A>>) -> Fetch<Vec<A>> {
    fetches.into_iter().fold(pure(Vec::new()), |acc, fetch| {
        acc.join(fetch).map(|(mut values, value)| {
            values.push(value);
            values
        })
    })
}

/// Map each item to a description and collect the results in input order.
pub fn traverse<T, A, F>(items: impl IntoIterator<Item = T>, f: F) -> Fetch<Vec<A>>
where
    A: Send + 'static,
    F: FnMut(T) -> Fetch<A>,
{
    collect(items.into_iter().map(f).collect())
}

//! The executor: a round loop that interprets fetch descriptions.
//!
//! Each iteration reduces the description to its next state. Ready values
//! and terminal errors end the run; a blocked frontier is resolved as one
//! *round*:
//!
//! 1. Deduplicate each group's requests (stable, first occurrence wins) and
//!    drop everything already cached.
//! 2. If nothing is left, the round is served from cache.
//! 3. One remaining group is fetched directly; several are spawned as
//!    parallel tasks and collected in submission order.
//! 4. On success, all result maps commit to the cache together; on any
//!    failure nothing commits and the run aborts with the round logged as
//!    an attempt.
//! 5. Every pending slot is filled from the merged cache view (original
//!    request order, duplicates included) and the continuation resumes.
//!
//! The environment — cache plus round log — is owned by the runner for the
//! duration of the run and handed back to the caller on completion or
//! embedded in the failure on abort.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rustc_hash::FxHashSet;
use tracing::instrument;

use crate::cache::RequestCache;
use crate::diagnostics::{FetchEnv, Round, RoundDetail};
use crate::errors::{FailureKind, FetchFailure, FetchResult};
use crate::fetch::{BatchRunner, Fetch, FetchState, Frontier, PendingRequest};
use crate::types::{CachedValue, RequestIdentity, RequestKey};

/// Run a description against a fresh cache, returning only the value.
#[instrument(skip(fetch), err)]
pub async fn run<A: Send + 'static>(fetch: Fetch<A>) -> FetchResult<A> {
    run_with_cache(fetch, RequestCache::new())
        .await
        .map(|(_, value)| value)
}

/// Run a description against a fresh cache, returning the environment
/// (round log and final cache) alongside the value.
#[instrument(skip(fetch), err)]
pub async fn run_with_env<A: Send + 'static>(fetch: Fetch<A>) -> FetchResult<(FetchEnv, A)> {
    run_with_cache(fetch, RequestCache::new()).await
}

/// Run a description for its diagnostics only.
#[instrument(skip(fetch), err)]
pub async fn run_env_only<A: Send + 'static>(fetch: Fetch<A>) -> FetchResult<FetchEnv> {
    run_with_env(fetch).await.map(|(env, _)| env)
}

/// Run a description starting from a caller-supplied cache.
///
/// Identities already present in `cache` are never re-fetched; a run whose
/// every identity is cached performs zero data-source calls and records one
/// cache-served round per blocked frontier.
#[instrument(skip(fetch, cache), err)]
pub async fn run_with_cache<A: Send + 'static>(
    fetch: Fetch<A>,
    cache: RequestCache,
) -> FetchResult<(FetchEnv, A)> {
    let mut env = FetchEnv::with_cache(cache);
    let mut current = fetch;
    loop {
        match current.state {
            FetchState::Done(value) => return Ok((env, value)),
            FetchState::Fail(kind) => return Err(FetchFailure::new(kind, env)),
            FetchState::Blocked(frontier, cont) => {
                if let Err(kind) = resolve_frontier(frontier, &mut env).await {
                    return Err(FetchFailure::new(kind, env));
                }
                current = cont();
            }
        }
    }
}

/// One group of the frontier, analyzed against the current cache.
struct PreparedGroup {
    runner: Arc<dyn BatchRunner>,
    pending: Vec<PendingRequest>,
    /// Stable-deduplicated requests, first occurrence order.
    distinct: Vec<RequestKey>,
    /// The distinct requests not already cached; what actually goes on
    /// the wire.
    misses: Vec<RequestKey>,
}

impl PreparedGroup {
    fn issued(&self) -> Vec<RequestKey> {
        if self.misses.is_empty() {
            self.distinct.clone()
        } else {
            self.misses.clone()
        }
    }
}

fn round_detail(prepared: &[PreparedGroup]) -> RoundDetail {
    if prepared.len() > 1 {
        return RoundDetail::Concurrent {
            batches: prepared
                .iter()
                .map(|group| (group.runner.source_name().to_string(), group.issued()))
                .collect(),
        };
    }
    let group = &prepared[0];
    let mut issued = group.issued();
    let source = group.runner.source_name().to_string();
    if issued.len() == 1 {
        RoundDetail::One {
            source,
            request: issued.remove(0),
        }
    } else {
        RoundDetail::Many {
            source,
            requests: issued,
        }
    }
}

async fn resolve_frontier(frontier: Frontier, env: &mut FetchEnv) -> Result<(), FailureKind> {
    let prev_cache = env.cache.clone();
    let when = Utc::now();
    let started = Instant::now();

    let mut prepared = Vec::with_capacity(frontier.groups.len());
    for group in frontier.groups {
        let mut seen = FxHashSet::default();
        let mut distinct = Vec::new();
        for pending in &group.pending {
            if seen.insert(pending.key.clone()) {
                distinct.push(pending.key.clone());
            }
        }
        let misses: Vec<RequestKey> = distinct
            .iter()
            .filter(|key| {
                !env.cache.contains(&RequestIdentity::from_key(
                    group.runner.source_name(),
                    (*key).clone(),
                ))
            })
            .cloned()
            .collect();
        prepared.push(PreparedGroup {
            runner: group.runner,
            pending: group.pending,
            distinct,
            misses,
        });
    }

    let detail = round_detail(&prepared);
    let to_fetch: Vec<&PreparedGroup> = prepared
        .iter()
        .filter(|group| !group.misses.is_empty())
        .collect();
    let served_from_cache = to_fetch.is_empty();

    let fetched: Result<Vec<(RequestIdentity, CachedValue)>, FailureKind> = if served_from_cache {
        Ok(Vec::new())
    } else if to_fetch.len() == 1 {
        let group = to_fetch[0];
        group.runner.run_batch(group.misses.clone()).await
    } else {
        // Fan the batches out as parallel tasks; awaiting the handles in
        // submission order keeps collection deterministic.
        let mut handles = Vec::with_capacity(to_fetch.len());
        for group in &to_fetch {
            let runner = Arc::clone(&group.runner);
            let misses = group.misses.clone();
            handles.push(tokio::spawn(async move { runner.run_batch(misses).await }));
        }
        let mut commits = Vec::new();
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(batch)) => commits.extend(batch),
                Ok(Err(kind)) => {
                    failure.get_or_insert(kind);
                }
                Err(join_error) => {
                    failure.get_or_insert(FailureKind::Internal(format!(
                        "batch task failed to join: {join_error}"
                    )));
                }
            }
        }
        match failure {
            Some(kind) => Err(kind),
            None => Ok(commits),
        }
    };

    let commits = match fetched {
        Ok(commits) => commits,
        Err(kind) => {
            // Log the attempt; the cache stays at its pre-round state.
            env.push_round(Round {
                prev_cache,
                detail,
                when,
                started,
                ended: Instant::now(),
                served_from_cache: false,
            });
            return Err(kind);
        }
    };

    if !commits.is_empty() {
        env.cache = env.cache.committed(commits);
    }

    // Fill every pending slot from the merged cache view, original order,
    // duplicates included.
    for group in &prepared {
        for pending in &group.pending {
            let identity =
                RequestIdentity::from_key(group.runner.source_name(), pending.key.clone());
            match env.cache.lookup(&identity) {
                Some(value) => pending.slot.fill(value),
                None => {
                    env.push_round(Round {
                        prev_cache,
                        detail: detail.clone(),
                        when,
                        started,
                        ended: Instant::now(),
                        served_from_cache: false,
                    });
                    return Err(FailureKind::Internal(format!(
                        "identity {identity:?} absent after commit"
                    )));
                }
            }
        }
    }

    tracing::debug!(
        label = detail.source_label(),
        requests = detail.request_count(),
        served_from_cache,
        "resolved round"
    );
    env.push_round(Round {
        prev_cache,
        detail,
        when,
        started,
        ended: Instant::now(),
        served_from_cache,
    });
    Ok(())
}

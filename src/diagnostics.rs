//! Execution environment and round history.
//!
//! Every run threads a [`FetchEnv`] through the round loop: the current
//! cache plus an append-only log of [`Round`]s. A round is one observable
//! unit of execution — a batch issued to a single data source, a concurrent
//! fan-out of batches across several sources, or an acknowledgement that the
//! whole frontier was served from cache.
//!
//! The environment is returned on success (via `run_with_env` and friends)
//! and embedded in the failure value on abort, so the same diagnostics are
//! available either way. [`Round::report`] and [`FetchEnv::report`] produce
//! serializable summaries for logs and dashboards.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::RequestCache;
use crate::types::RequestKey;

/// What a round issued, keyed by data-source name.
///
/// `One` and `Many` describe a round against a single source; `Concurrent`
/// describes a fan-out round, one batch per source, listed in construction
/// order.
#[derive(Clone, Debug)]
pub enum RoundDetail {
    One {
        source: String,
        request: RequestKey,
    },
    Many {
        source: String,
        requests: Vec<RequestKey>,
    },
    Concurrent {
        batches: Vec<(String, Vec<RequestKey>)>,
    },
}

impl RoundDetail {
    /// The label identifying this round: the source name, or `"Concurrent"`
    /// for fan-out rounds.
    #[must_use]
    pub fn source_label(&self) -> &str {
        match self {
            RoundDetail::One { source, .. } | RoundDetail::Many { source, .. } => source,
            RoundDetail::Concurrent { .. } => "Concurrent",
        }
    }

    /// Total number of requests described by this round.
    #[must_use]
    pub fn request_count(&self) -> usize {
        match self {
            RoundDetail::One { .. } => 1,
            RoundDetail::Many { requests, .. } => requests.len(),
            RoundDetail::Concurrent { batches } => {
                batches.iter().map(|(_, requests)| requests.len()).sum()
            }
        }
    }
}

/// One entry in the round log.
#[derive(Clone, Debug)]
pub struct Round {
    /// Snapshot of the cache as it stood when the round started.
    pub prev_cache: RequestCache,
    /// What was issued, and to whom.
    pub detail: RoundDetail,
    /// Wall-clock timestamp for log correlation.
    pub when: DateTime<Utc>,
    /// Monotonic start of the round.
    pub started: Instant,
    /// Monotonic end of the round.
    pub ended: Instant,
    /// `true` when every request was already cached and no data source
    /// was invoked.
    pub served_from_cache: bool,
}

impl Round {
    /// Elapsed time between the round's start and end.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended.duration_since(self.started)
    }

    /// Serializable summary of this round.
    #[must_use]
    pub fn report(&self) -> RoundReport {
        let batches = match &self.detail {
            RoundDetail::One { source, request } => vec![BatchReport {
                source: source.clone(),
                requests: vec![format!("{request:?}")],
            }],
            RoundDetail::Many { source, requests } => vec![BatchReport {
                source: source.clone(),
                requests: requests.iter().map(|r| format!("{r:?}")).collect(),
            }],
            RoundDetail::Concurrent { batches } => batches
                .iter()
                .map(|(source, requests)| BatchReport {
                    source: source.clone(),
                    requests: requests.iter().map(|r| format!("{r:?}")).collect(),
                })
                .collect(),
        };
        RoundReport {
            label: self.detail.source_label().to_string(),
            batches,
            duration_us: self.duration().as_micros() as u64,
            served_from_cache: self.served_from_cache,
            when: self.when,
        }
    }
}

/// One source's share of a round, rendered for serialization.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub source: String,
    pub requests: Vec<String>,
}

/// Serializable summary of one round.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundReport {
    pub label: String,
    pub batches: Vec<BatchReport>,
    pub duration_us: u64,
    pub served_from_cache: bool,
    pub when: DateTime<Utc>,
}

/// Serializable summary of a whole run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvReport {
    pub rounds: Vec<RoundReport>,
    pub cached_identities: usize,
}

/// Executor-private state for one run: the current cache and the round log.
///
/// Exists only for the duration of a run; the runners hand it back to the
/// caller on completion. The final cache may seed a later run.
#[derive(Clone, Debug, Default)]
pub struct FetchEnv {
    pub cache: RequestCache,
    pub rounds: Vec<Round>,
}

impl FetchEnv {
    /// An empty environment with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment starting from a caller-supplied cache.
    #[must_use]
    pub fn with_cache(cache: RequestCache) -> Self {
        Self {
            cache,
            rounds: Vec::new(),
        }
    }

    pub(crate) fn push_round(&mut self, round: Round) {
        self.rounds.push(round);
    }

    /// Rounds that actually invoked a data source (cache-served rounds
    /// filtered out).
    pub fn source_rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter().filter(|round| !round.served_from_cache)
    }

    /// Serializable summary of this run.
    #[must_use]
    pub fn report(&self) -> EnvReport {
        EnvReport {
            rounds: self.rounds.iter().map(Round::report).collect(),
            cached_identities: self.cache.len(),
        }
    }
}

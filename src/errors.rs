//! Failure surface of the engine.
//!
//! Errors are deliberately untyped per data source: a single open kind,
//! [`FetchError`], carries a message, an optional cause chain, and free-form
//! JSON details. Data sources return it from `fetch`; user code raises it
//! through the `error` constructor. The executor classifies what went wrong
//! in [`FailureKind`] and surfaces every abort as a [`FetchFailure`] that
//! carries the execution environment — round history plus the cache as it
//! stood when the failure was observed.
//!
//! # Examples
//!
//! ```rust
//! use fetchloom::errors::FetchError;
//! use serde_json::json;
//!
//! let err = FetchError::msg("article lookup failed")
//!     .with_cause(FetchError::msg("connection refused"))
//!     .with_details(json!({"host": "db-1"}));
//!
//! assert_eq!(err.to_string(), "article lookup failed");
//! assert_eq!(err.cause.unwrap().message, "connection refused");
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::FetchEnv;
use crate::types::RequestKey;

/// Result alias for the engine's runners.
pub type FetchResult<T> = Result<T, FetchFailure>;

/// The single open error kind.
///
/// Used by data sources to report backend failures and by callers to abort
/// a description with a domain error. Serializes to JSON with the cause
/// chain inlined, so failures can be shipped to logs or over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<FetchError>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for FetchError {
    fn default() -> Self {
        FetchError {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl FetchError {
    /// An error with just a message.
    pub fn msg<M: Into<String>>(message: M) -> Self {
        FetchError {
            message: message.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: FetchError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl From<String> for FetchError {
    fn from(message: String) -> Self {
        FetchError::msg(message)
    }
}

impl From<&str> for FetchError {
    fn from(message: &str) -> Self {
        FetchError::msg(message)
    }
}

/// What aborted a run.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum FailureKind {
    /// A data source's response map omitted one or more requested keys.
    #[error("data source `{source_name}` omitted requested keys from its response: {missing:?}")]
    #[diagnostic(
        code(fetchloom::missing_identity),
        help("A batch fetch must return every request it was handed. Check the source's lookup logic.")
    )]
    MissingIdentity {
        source_name: String,
        missing: Vec<RequestKey>,
    },

    /// A data source's fetch itself failed.
    #[error("data source `{source_name}` failed: {error}")]
    #[diagnostic(
        code(fetchloom::source),
        help("The failure originates inside the data source; the round log shows what was in flight.")
    )]
    Source {
        source_name: String,
        error: FetchError,
    },

    /// The description contained an explicit error.
    #[error("fetch aborted: {0}")]
    #[diagnostic(code(fetchloom::user))]
    User(FetchError),

    /// An executor invariant was violated (for example a batch task failed
    /// to join). Never produced by conforming data sources.
    #[error("executor invariant violated: {0}")]
    #[diagnostic(code(fetchloom::internal))]
    Internal(String),
}

/// A failed run: the failure kind plus the environment at the point of
/// failure, including the round log up to and including the failing
/// round's attempt.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("fetch failed after {} round(s): {kind}", .env.rounds.len())]
#[diagnostic(
    code(fetchloom::run_failed),
    help("Inspect `env` for the round history and the cache at the point of failure.")
)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub env: FetchEnv,
}

impl FetchFailure {
    pub(crate) fn new(kind: FailureKind, env: FetchEnv) -> Self {
        Self { kind, env }
    }
}

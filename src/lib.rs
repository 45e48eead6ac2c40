//! ```text
//! pure / fetch_one / error ─┬─► Fetch<A> (pure description)
//!                           │      │
//!    map / flat_map / join ─┘      ├─► run / run_with_cache ─► round loop
//!    collect / traverse            │                            │
//!                                  │                            ├─► dedupe + cache lookup
//!                                  │                            ├─► DataSource::fetch (batched,
//!                                  │                            │    concurrent across sources)
//!                                  │                            └─► RequestCache + Round log
//!                                  │
//!                                  └─► FetchEnv / FetchFailure (diagnostics either way)
//! ```
//!
//! Fetchloom is a deferred data-fetching engine: client code describes what
//! data it needs as a pure, composable [`fetch::Fetch`] value, and the
//! executor runs the description with automatic batching, deduplication,
//! and caching. Independent sub-computations fetch concurrently; dependent
//! ones (expressed with `flat_map`) run in strictly ordered rounds.

pub mod cache;
pub mod diagnostics;
pub mod errors;
pub mod fetch;
pub mod runner;
pub mod source;
pub mod telemetry;
pub mod types;

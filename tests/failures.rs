//! Failure propagation, round-log capture, and commit atomicity.

mod common;

use std::sync::Arc;

use common::*;
use fetchloom::errors::FailureKind;
use fetchloom::fetch::{error, fetch_one, Fetch};
use fetchloom::runner::{run, run_with_env};
use fetchloom::telemetry::{pretty_print_failure_with_mode, FormatterMode};

#[tokio::test]
async fn explicit_error_surfaces_as_user_failure() {
    let fetch: Fetch<u32> = error("boom");
    let failure = run(fetch).await.unwrap_err();

    match &failure.kind {
        FailureKind::User(err) => assert_eq!(err.message, "boom"),
        other => panic!("expected a user failure, got {other:?}"),
    }
    assert!(failure.env.rounds.is_empty());
    assert!(failure.to_string().contains("boom"));
}

#[tokio::test]
async fn source_failure_names_the_source_and_logs_the_attempt() {
    let broken = BrokenSource::new();
    let failure = run_with_env(fetch_one(&broken, 2)).await.unwrap_err();

    match &failure.kind {
        FailureKind::Source { source_name, error } => {
            assert_eq!(source_name, "BrokenSource");
            assert_eq!(error.message, "backend offline");
        }
        other => panic!("expected a source failure, got {other:?}"),
    }
    // The failing round's attempt is logged; nothing was cached.
    assert_eq!(failure.env.rounds.len(), 1);
    assert!(!failure.env.rounds[0].served_from_cache);
    assert!(failure.env.cache.is_empty());
}

#[tokio::test]
async fn omitted_keys_fail_as_missing_identity() {
    let absent = AbsentSource::new();
    let failure = run(fetch_one(&absent, 7)).await.unwrap_err();

    match &failure.kind {
        FailureKind::MissingIdentity {
            source_name,
            missing,
        } => {
            assert_eq!(source_name, "AbsentSource");
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].downcast_ref::<u32>(), Some(&7));
        }
        other => panic!("expected a missing-identity failure, got {other:?}"),
    }
    assert_eq!(absent.log.batches(), vec![vec![7]]);
}

#[tokio::test]
async fn producer_rounds_survive_a_downstream_failure() {
    let articles = ArticleSource::new();
    let broken = BrokenSource::new();
    let fetch = fetch_one(&articles, 1).flat_map(move |_| fetch_one(&broken, 2));

    let failure = run_with_env(fetch).await.unwrap_err();

    assert_eq!(failure.env.rounds.len(), 2);
    assert!(!failure.env.rounds[0].served_from_cache);
    // The successful producer round is still committed.
    assert_eq!(
        failure.env.cache.get(articles.as_ref(), &1),
        Some(article(1))
    );
}

#[tokio::test]
async fn concurrent_round_failure_commits_nothing() {
    let articles = ArticleSource::new();
    let broken = BrokenSource::new();

    let fetch = fetch_one(&articles, 1).join(fetch_one(&broken, 2));
    let failure = run_with_env(fetch).await.unwrap_err();

    match &failure.kind {
        FailureKind::Source { source_name, .. } => assert_eq!(source_name, "BrokenSource"),
        other => panic!("expected the broken source to surface, got {other:?}"),
    }

    // Both batches were issued, but the round commits atomically: the
    // article result is discarded along with the failed batch.
    assert_eq!(articles.log.call_count(), 1);
    assert_eq!(broken.log.call_count(), 1);
    assert!(failure.env.cache.is_empty());
    assert_eq!(failure.env.rounds.len(), 1);
}

#[tokio::test]
async fn failure_after_success_keeps_prior_cache() {
    let articles = ArticleSource::new();
    let absent = AbsentSource::new();
    let absent_in = Arc::clone(&absent);

    let fetch =
        fetch_one(&articles, 3).flat_map(move |post| fetch_one(&absent_in, post.id + 100));
    let failure = run_with_env(fetch).await.unwrap_err();

    // The pre-failure cache is exactly the committed first round.
    assert_eq!(failure.env.cache.len(), 1);
    assert_eq!(
        failure.env.rounds.last().unwrap().prev_cache.len(),
        failure.env.cache.len()
    );
    assert_eq!(absent.log.batches(), vec![vec![103]]);
}

#[tokio::test]
async fn failures_render_with_their_round_history() {
    let broken = BrokenSource::new();
    let failure = run_with_env(fetch_one(&broken, 9)).await.unwrap_err();

    let rendered = pretty_print_failure_with_mode(&failure, FormatterMode::Plain);
    assert!(rendered.contains("BrokenSource"));
    assert!(rendered.contains("backend offline"));
    assert!(rendered.contains("[0]"));
    assert!(!rendered.contains("\x1b["));
}

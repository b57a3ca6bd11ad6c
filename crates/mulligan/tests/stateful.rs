// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for stateful retry execution: context caching across
//! `execute` calls, rollback re-raises, and exhaustion at re-entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use mulligan::cache::InMemoryContextCache;
use mulligan::recover::RecoverArgs;
use mulligan::stats::{StatisticsListener, StatsRepository};
use mulligan::{KindClassifier, RetryError, RetryState, Retrier};

fn reset() -> std::io::Error {
    std::io::Error::other("connection reset")
}

fn engine(max_attempts: u32) -> Retrier<std::io::Error> {
    Retrier::builder()
        .max_attempts(max_attempts)
        .retry_on::<std::io::Error>()
        .build()
        .expect("configuration is consistent")
}

#[test]
fn cached_context_accumulates_across_calls() {
    let retrier = engine(3);
    let state = RetryState::new("k");

    let mut observed = Vec::new();
    for _ in 0..3 {
        let err = retrier
            .execute_stateful::<(), _>(&state, |ctx| {
                observed.push(ctx.retry_count());
                Err(reset())
            })
            .expect_err("every attempt fails");
        assert!(matches!(err, RetryError::Failed(_)), "failures re-raise so the caller can roll back");
    }

    // The same cached context was resumed on each call.
    assert_eq!(observed, vec![0, 1, 2]);
}

#[test]
fn exhaustion_is_detected_at_reentry() {
    let retrier = engine(2);
    let state = RetryState::new("k");

    for _ in 0..2 {
        let err = retrier.execute_stateful::<(), _>(&state, |_ctx| Err(reset())).expect_err("attempt fails");
        assert!(matches!(err, RetryError::Failed(_)));
    }

    // The cached policy refuses at entry; without recovery this is the
    // exhausted-retry failure and the operation is not invoked.
    let invoked = AtomicU32::new(0);
    let err = retrier
        .execute_stateful::<(), _>(&state, |_ctx| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Err(reset())
        })
        .expect_err("the series is exhausted");

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert!(matches!(err, RetryError::ExhaustedRetry));

    // Exhaustion retires the cache entry: the next call starts fresh.
    let value = retrier
        .execute_stateful(&state, |ctx| {
            assert_eq!(ctx.retry_count(), 0);
            Ok("fresh")
        })
        .expect("fresh series succeeds");
    assert_eq!(value, "fresh");
}

#[test]
fn exhaustion_at_reentry_runs_recovery() {
    let retrier = engine(1);
    let state = RetryState::new("k");

    let err = retrier.execute_stateful::<&str, _>(&state, |_ctx| Err(reset())).expect_err("attempt fails");
    assert!(matches!(err, RetryError::Failed(_)));

    let value = retrier
        .execute_stateful_with_recovery(
            &state,
            |_ctx| Err(reset()),
            |args: RecoverArgs<'_, std::io::Error>| {
                // The fault was surfaced to the previous caller; recovery
                // runs from the cached series without it.
                assert!(args.fault().is_none());
                Ok("recovered")
            },
        )
        .expect("recovery produces a value");

    assert_eq!(value, "recovered");
}

#[test]
fn success_retires_the_cache_entry() {
    let retrier = engine(3);
    let state = RetryState::new("k");

    let err = retrier.execute_stateful::<(), _>(&state, |_ctx| Err(reset())).expect_err("first attempt fails");
    assert!(matches!(err, RetryError::Failed(_)));

    let value = retrier
        .execute_stateful(&state, |ctx| {
            assert_eq!(ctx.retry_count(), 1);
            Ok("done")
        })
        .expect("second attempt succeeds");
    assert_eq!(value, "done");

    // A later call with the same key starts a fresh series.
    let _ = retrier.execute_stateful(&state, |ctx| {
        assert_eq!(ctx.retry_count(), 0);
        Ok(())
    });
}

#[test]
fn force_refresh_replaces_the_cached_context() {
    let retrier = engine(3);

    let state = RetryState::new("k");
    let err = retrier.execute_stateful::<(), _>(&state, |_ctx| Err(reset())).expect_err("attempt fails");
    assert!(matches!(err, RetryError::Failed(_)));

    let refreshed = RetryState::new("k").force_refresh(true);
    let _ = retrier.execute_stateful(&refreshed, |ctx| {
        assert_eq!(ctx.retry_count(), 0);
        Ok(())
    });
}

#[test]
fn keyless_state_bypasses_the_cache() {
    let retrier = engine(3);
    let state: RetryState<std::io::Error> = RetryState::keyless();

    for _ in 0..2 {
        let err = retrier
            .execute_stateful::<(), _>(&state, |ctx| {
                // Every call starts from a fresh context.
                assert_eq!(ctx.retry_count(), 0);
                Err(reset())
            })
            .expect_err("attempt fails");
        assert!(matches!(err, RetryError::Failed(_)));
    }
}

#[test]
fn rollback_classifier_keeps_excluded_faults_in_call() {
    let retrier = engine(3);
    let state = RetryState::new("k")
        .rollback_on(KindClassifier::builder(true).when(|_: &std::io::Error| true, false).build());

    // No fault rolls back, so the whole series runs within one call.
    let attempts = AtomicU32::new(0);
    let err = retrier
        .execute_stateful::<(), _>(&state, |_ctx| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(reset())
        })
        .expect_err("the series exhausts in-call");

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(err, RetryError::Exhausted(_)));
}

#[test]
fn cache_capacity_is_a_hard_failure() {
    let retrier: Retrier<std::io::Error> = Retrier::builder()
        .max_attempts(3)
        .cache(InMemoryContextCache::new(1))
        .build()
        .expect("configuration is consistent");

    let first = RetryState::new("a");
    let err = retrier.execute_stateful::<(), _>(&first, |_ctx| Err(reset())).expect_err("attempt fails");
    assert!(matches!(err, RetryError::Failed(_)));

    let invoked = AtomicU32::new(0);
    let second = RetryState::new("b");
    let err = retrier
        .execute_stateful::<(), _>(&second, |_ctx| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .expect_err("the cache is full");

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert!(matches!(err, RetryError::CacheCapacityExceeded(_)));
}

#[test]
fn stateful_statistics_count_attempts_per_call() {
    let repository = Arc::new(StatsRepository::new());
    let retrier: Retrier<std::io::Error> = Retrier::builder()
        .max_attempts(2)
        .label("stateful")
        .listener(StatisticsListener::new(Arc::clone(&repository)))
        .build()
        .expect("configuration is consistent");

    let state = RetryState::new("k");
    let _ = retrier.execute_stateful::<(), _>(&state, |_ctx| Err(reset()));
    let _ = retrier.execute_stateful(&state, |_ctx| Ok(()));

    let snapshot = repository.stats("stateful").snapshot();
    assert_eq!(snapshot.started, 2);
    assert_eq!(snapshot.error, 1);
    assert_eq!(snapshot.complete, 1);
}

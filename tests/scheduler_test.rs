//! Scheduler timing and failure policy, driven on a paused clock.

mod common;

use std::time::Duration;

use common::{sample_messages, FakeSource, MemoryStore, Outcome};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tg_channel_worker::constants::KEY_CHANNEL_POSTS;
use tg_channel_worker::worker::{Scheduler, WorkerError, WorkerSettings, WorkerState};

fn scheduler(
    source: FakeSource,
    store: MemoryStore,
    shutdown: &CancellationToken,
) -> Scheduler<FakeSource, MemoryStore> {
    Scheduler::new(source, store, WorkerSettings::default(), shutdown.clone())
}

#[tokio::test(start_paused = true)]
async fn test_collects_immediately_then_every_interval() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages()).stop_after(3, shutdown.clone());
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    let started = Instant::now();
    worker.run().await.unwrap();

    let times = worker.source().resolve_times();
    assert_eq!(times.len(), 3);
    assert!(times[0] - started < Duration::from_secs(1));
    assert!(times[1] - times[0] >= Duration::from_secs(900));
    assert!(times[2] - times[1] >= Duration::from_secs(900));

    assert_eq!(worker.cycles_published(), 3);
    assert_eq!(worker.store().writes(), 3);
    assert!(worker.store().value(KEY_CHANNEL_POSTS).is_some());

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(!worker.source().connected);
    assert!(!worker.store().connected);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_without_counting_failure() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages())
        .script(&[Outcome::RateLimited(Duration::from_secs(30))])
        .stop_after(2, shutdown.clone());
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    worker.run().await.unwrap();

    let times = worker.source().resolve_times();
    assert_eq!(times.len(), 2);
    let gap = times[1] - times[0];
    assert!(gap >= Duration::from_secs(30));
    assert!(gap < Duration::from_secs(900));

    assert_eq!(worker.consecutive_failures(), 0);
    assert_eq!(worker.cycles_published(), 1);
    assert_eq!(worker.store().writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_failures_are_fatal() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages()).script(&[Outcome::Transport; 5]);
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    let err = worker.run().await.unwrap_err();

    assert!(matches!(err, WorkerError::ConsecutiveFailureLimit { failures: 5 }));
    assert_eq!(worker.source().cycles_attempted(), 5);
    assert_eq!(worker.store().writes(), 0);

    let times = worker.source().resolve_times();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(60));
    }

    assert_eq!(worker.state(), WorkerState::Failed);
    assert!(!worker.source().connected);
    assert!(!worker.store().connected);
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_count() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages())
        .script(&[Outcome::Transport; 4])
        .stop_after(5, shutdown.clone());
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    worker.run().await.unwrap();

    assert_eq!(worker.source().cycles_attempted(), 5);
    assert_eq!(worker.consecutive_failures(), 0);
    assert_eq!(worker.cycles_published(), 1);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_neither_count_nor_reset_failures() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages()).script(&[
        Outcome::Transport,
        Outcome::Transport,
        Outcome::Transport,
        Outcome::RateLimited(Duration::from_secs(10)),
        Outcome::Transport,
        Outcome::Transport,
    ]);
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    let err = worker.run().await.unwrap_err();

    assert!(matches!(err, WorkerError::ConsecutiveFailureLimit { failures: 5 }));
    assert_eq!(worker.source().cycles_attempted(), 6);
    assert_eq!(worker.cycles_published(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_channel_counts_as_failure() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages())
        .script(&[Outcome::NotFound])
        .stop_after(2, shutdown.clone());
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    worker.run().await.unwrap();

    let times = worker.source().resolve_times();
    assert!(times[1] - times[0] >= Duration::from_secs(60));
    assert_eq!(worker.cycles_published(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_store_connect_retried_before_source() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages()).stop_after(1, shutdown.clone());
    let store = MemoryStore::new().connect_failures(2);
    let mut worker = scheduler(source, store, &shutdown);

    let started = Instant::now();
    worker.run().await.unwrap();

    assert_eq!(worker.store().connect_calls, 3);
    assert_eq!(worker.source().connect_calls, 1);

    // 5s after the first failure, 10s after the second.
    let first_cycle = worker.source().resolve_times()[0];
    assert!(first_cycle - started >= Duration::from_secs(15));
    assert_eq!(worker.cycles_published(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_is_fatal() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages());
    let store = MemoryStore::new().connect_failures(u32::MAX);
    let mut worker = scheduler(source, store, &shutdown);

    let err = worker.run().await.unwrap_err();

    match err {
        WorkerError::ConnectionExhausted {
            service, attempts, ..
        } => {
            assert_eq!(service, "state store");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(worker.store().connect_calls, 5);
    assert_eq!(worker.source().connect_calls, 0);
    assert_eq!(worker.state(), WorkerState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_source_is_fatal() {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(sample_messages()).connect_failures(u32::MAX);
    let mut worker = scheduler(source, MemoryStore::new(), &shutdown);

    let err = worker.run().await.unwrap_err();

    assert!(matches!(
        err,
        WorkerError::ConnectionExhausted {
            service: "channel source",
            attempts: 5,
            ..
        }
    ));
    assert_eq!(worker.source().cycles_attempted(), 0);
    assert!(!worker.store().connected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_connect_backoff() {
    let shutdown = CancellationToken::new();
    let store = MemoryStore::new().connect_failures(u32::MAX);
    let mut worker = scheduler(FakeSource::new(sample_messages()), store, &shutdown);

    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        token.cancel();
    });

    worker.run().await.unwrap();

    // Attempts at 0s and 5s; shutdown lands inside the 10s backoff.
    assert_eq!(worker.store().connect_calls, 2);
    assert_eq!(worker.source().connect_calls, 0);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_first_cycle() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut worker = scheduler(
        FakeSource::new(sample_messages()),
        MemoryStore::new(),
        &shutdown,
    );

    worker.run().await.unwrap();

    assert_eq!(worker.source().cycles_attempted(), 0);
    assert_eq!(worker.store().writes(), 0);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_interval_wait() {
    let shutdown = CancellationToken::new();
    let mut worker = scheduler(
        FakeSource::new(sample_messages()),
        MemoryStore::new(),
        &shutdown,
    );

    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(120)).await;
        token.cancel();
    });

    let started = Instant::now();
    worker.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(900));
    assert_eq!(worker.source().cycles_attempted(), 1);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

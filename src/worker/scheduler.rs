//! The worker run loop and its failure policy.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cycle::{run_cycle, CycleError};
use super::retry::{connect_with_retry, ConnectOutcome, RetryPolicy};
use super::pause;
use crate::constants::KEY_LAST_UPDATE;
use crate::source::ChannelSource;
use crate::store::StateStore;

/// Fatal worker conditions. The process should exit and let its supervisor
/// restart it.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot connect to {service} after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        service: &'static str,
        attempts: u32,
        last_error: String,
    },
    #[error("{failures} consecutive collection failures")]
    ConsecutiveFailureLimit { failures: u32 },
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Running,
    Stopping,
    Stopped,
    /// Terminal state after a fatal error.
    Failed,
}

/// Settings the scheduler runs with.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub channel_username: String,
    pub posts_count: usize,
    pub update_interval: Duration,
    pub connect_retries: u32,
    pub connect_backoff_step: Duration,
    pub max_consecutive_failures: u32,
    pub failure_cooldown: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            channel_username: "itatmisis".to_string(),
            posts_count: 5,
            update_interval: Duration::from_secs(900),
            connect_retries: 5,
            connect_backoff_step: Duration::from_secs(5),
            max_consecutive_failures: 5,
            failure_cooldown: Duration::from_secs(60),
        }
    }
}

impl WorkerSettings {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_retries,
            backoff_step: self.connect_backoff_step,
        }
    }
}

/// Owns both connections and runs collection cycles until stopped.
///
/// Only one cycle is ever in flight. Shutdown is observed before each cycle
/// and during every sleep; a running cycle is never interrupted.
pub struct Scheduler<S, T> {
    source: S,
    store: T,
    settings: WorkerSettings,
    shutdown: CancellationToken,
    state: WorkerState,
    consecutive_failures: u32,
    cycles_published: u64,
}

impl<S, T> Scheduler<S, T>
where
    S: ChannelSource,
    T: StateStore,
{
    #[must_use]
    pub fn new(source: S, store: T, settings: WorkerSettings, shutdown: CancellationToken) -> Self {
        Self {
            source,
            store,
            settings,
            shutdown,
            state: WorkerState::Disconnected,
            consecutive_failures: 0,
            cycles_published: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn cycles_published(&self) -> u64 {
        self.cycles_published
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn store(&self) -> &T {
        &self.store
    }

    /// Connect, collect immediately, then collect every interval until
    /// shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error when connection attempts are exhausted or the
    /// consecutive-failure limit is reached. Both are fatal.
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        info!(
            channel = %self.settings.channel_username,
            interval_secs = self.settings.update_interval.as_secs(),
            posts = self.settings.posts_count,
            "Starting worker"
        );

        self.transition(WorkerState::Connecting);
        let result = match self.connect().await {
            Ok(true) => {
                self.transition(WorkerState::Running);
                self.run_loop().await
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.stop().await;
                Ok(())
            }
            Err(e) => {
                error!(critical = true, "{e}. Exiting for supervisor restart");
                self.disconnect_all().await;
                self.transition(WorkerState::Failed);
                Err(e)
            }
        }
    }

    /// Connect the store, then the source. `Ok(false)` means shutdown arrived
    /// while waiting to retry.
    async fn connect(&mut self) -> Result<bool, WorkerError> {
        let policy = self.settings.retry_policy();

        let outcome = connect_with_retry(
            &mut self.store,
            "state store",
            policy,
            &self.shutdown,
            |store| store.connect(),
        )
        .await?;
        if outcome == ConnectOutcome::Cancelled {
            return Ok(false);
        }
        self.log_previous_update().await;

        let outcome = connect_with_retry(
            &mut self.source,
            "channel source",
            policy,
            &self.shutdown,
            |source| source.connect(),
        )
        .await?;

        Ok(outcome != ConnectOutcome::Cancelled)
    }

    async fn log_previous_update(&self) {
        match self.store.get(KEY_LAST_UPDATE).await {
            Ok(Some(timestamp)) => info!(last_update = %timestamp, "Found previously published state"),
            Ok(None) => info!("No previously published state"),
            Err(e) => warn!("Could not read previous update time: {e}"),
        }
    }

    async fn run_loop(&mut self) -> Result<(), WorkerError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            let wait = self.collect_once().await?;
            if !pause(wait, &self.shutdown).await {
                return Ok(());
            }
        }
    }

    /// Run one cycle and decide how long to wait before the next one.
    async fn collect_once(&mut self) -> Result<Duration, WorkerError> {
        let result = run_cycle(
            &self.source,
            &self.store,
            &self.settings.channel_username,
            self.settings.posts_count,
        )
        .await;

        match result {
            Ok(state) => {
                self.consecutive_failures = 0;
                self.cycles_published += 1;
                info!(
                    posts = state.posts.len(),
                    cycles = self.cycles_published,
                    "Collection completed successfully"
                );
                info!(
                    next_in_secs = self.settings.update_interval.as_secs(),
                    "Next update scheduled"
                );
                Ok(self.settings.update_interval)
            }
            Err(CycleError::RateLimited(wait)) => {
                warn!(wait_secs = wait.as_secs(), "Rate limited, waiting before retry");
                Ok(wait)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let max = self.settings.max_consecutive_failures;
                error!(
                    failures = self.consecutive_failures,
                    max_failures = max,
                    "Collection failed: {e}"
                );

                let store_healthy = self.store.ping().await;
                if store_healthy {
                    debug!("State store is reachable");
                } else {
                    warn!("State store is not answering");
                }

                if self.consecutive_failures >= max {
                    return Err(WorkerError::ConsecutiveFailureLimit {
                        failures: self.consecutive_failures,
                    });
                }
                Ok(self.settings.failure_cooldown)
            }
        }
    }

    async fn stop(&mut self) {
        info!("Stopping worker...");
        self.transition(WorkerState::Stopping);
        self.disconnect_all().await;
        self.transition(WorkerState::Stopped);
        info!("Worker stopped");
    }

    async fn disconnect_all(&mut self) {
        if let Err(e) = self.source.disconnect().await {
            warn!("Failed to disconnect channel source: {e}");
        }
        if let Err(e) = self.store.disconnect().await {
            warn!("Failed to disconnect state store: {e}");
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
    }
}

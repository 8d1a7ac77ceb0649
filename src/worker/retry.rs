//! Bounded connection retry with linear backoff.

use std::fmt::Display;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{pause, WorkerError};

/// How many times to try a connection and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// The wait after failed attempt `n` is `backoff_step * n`.
    pub backoff_step: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(5),
        }
    }
}

/// How a retried connection ended, short of exhausting its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { attempts: u32 },
    /// Shutdown was requested while waiting between attempts.
    Cancelled,
}

/// Call `connect` on `target` until it succeeds or the attempts run out.
///
/// # Errors
///
/// Returns [`WorkerError::ConnectionExhausted`] once every attempt has failed.
pub async fn connect_with_retry<T, E, F>(
    target: &mut T,
    service: &'static str,
    policy: RetryPolicy,
    shutdown: &CancellationToken,
    mut connect: F,
) -> Result<ConnectOutcome, WorkerError>
where
    T: ?Sized,
    E: Display,
    F: for<'a> FnMut(&'a mut T) -> BoxFuture<'a, Result<(), E>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match connect(&mut *target).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(service, attempt, "Connected after retry");
                }
                return Ok(ConnectOutcome::Connected { attempts: attempt });
            }
            Err(e) => {
                error!(
                    service,
                    attempt,
                    max_attempts,
                    "Connection failed: {e}"
                );

                if attempt == max_attempts {
                    return Err(WorkerError::ConnectionExhausted {
                        service,
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }

                let delay = policy.backoff(attempt);
                info!(service, delay_secs = delay.as_secs(), "Retrying connection");
                if !pause(delay, shutdown).await {
                    return Ok(ConnectOutcome::Cancelled);
                }
            }
        }
    }

    unreachable!("retry loop returns on the last attempt")
}

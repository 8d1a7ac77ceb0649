//! Collection scheduling: the cycle, connection retry and the run loop.

mod cycle;
mod retry;
mod scheduler;

pub use cycle::{run_cycle, CycleError};
pub use retry::{connect_with_retry, ConnectOutcome, RetryPolicy};
pub use scheduler::{Scheduler, WorkerError, WorkerSettings, WorkerState};

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `false` when the sleep was cut short by shutdown.
pub(crate) async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = shutdown.cancelled() => false,
    }
}

//! One fetch, normalize and publish pass.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::collector::{collect_posts, collect_stats};
use crate::models::PublishedState;
use crate::source::{ChannelSource, SourceError};
use crate::store::{publish, StateStore, StoreError};

/// Why a cycle did not publish.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The source asked for a pause; not a failure.
    #[error("rate limited for {}s", .0.as_secs())]
    RateLimited(Duration),
    #[error("collection failed: {0}")]
    Source(SourceError),
    #[error("publish failed: {0}")]
    Store(#[from] StoreError),
}

impl CycleError {
    /// The wait the source demanded, if this was a rate limit.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(wait) => Some(*wait),
            Self::Source(_) | Self::Store(_) => None,
        }
    }
}

impl From<SourceError> for CycleError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::RateLimited { wait } => Self::RateLimited(wait),
            other => Self::Source(other),
        }
    }
}

/// Collect a fresh snapshot and post list, then publish both atomically.
///
/// Nothing is written unless collection succeeds in full.
///
/// # Errors
///
/// Returns an error if any fetch fails or the publish is rejected.
pub async fn run_cycle<S, T>(
    source: &S,
    store: &T,
    username: &str,
    posts_count: usize,
) -> Result<PublishedState, CycleError>
where
    S: ChannelSource + ?Sized,
    T: StateStore + ?Sized,
{
    let collected_at = Utc::now();
    info!(started_at = %collected_at.to_rfc3339(), "Starting collection");

    let (channel, snapshot) = collect_stats(source, username, collected_at).await?;
    let posts = collect_posts(source, &channel, username, posts_count, collected_at).await?;

    let state = PublishedState {
        snapshot,
        posts,
        last_update: Utc::now(),
    };
    publish(store, &state).await?;

    Ok(state)
}

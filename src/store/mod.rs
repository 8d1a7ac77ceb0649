//! Shared key-value store holding the last published state.

mod redis_store;

pub use redis_store::RedisStore;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{KEY_CHANNEL_POSTS, KEY_CHANNEL_STATS, KEY_LAST_UPDATE};
use crate::models::PublishedState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store client not connected")]
    NotConnected,
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("store error: {0}")]
    Other(String),
}

/// Key-value store with an all-or-nothing multi-key write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Open the connection and verify it answers.
    async fn connect(&mut self) -> Result<(), StoreError>;

    /// Close the connection.
    async fn disconnect(&mut self) -> Result<(), StoreError>;

    /// Whether the store currently answers.
    async fn ping(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write every entry as one transaction. Readers see all of them or none.
    async fn set_atomic(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;
}

/// Serialize a published state into its three key/value entries.
///
/// # Errors
///
/// Returns an error if a record fails to serialize.
pub fn encode_state(state: &PublishedState) -> Result<Vec<(&'static str, String)>, StoreError> {
    let stats = serde_json::to_string(&state.snapshot).map_err(|source| StoreError::Serialize {
        what: "channel stats",
        source,
    })?;
    let posts = serde_json::to_string(&state.posts).map_err(|source| StoreError::Serialize {
        what: "channel posts",
        source,
    })?;

    Ok(vec![
        (KEY_CHANNEL_STATS, stats),
        (KEY_CHANNEL_POSTS, posts),
        (KEY_LAST_UPDATE, state.last_update.to_rfc3339()),
    ])
}

/// Publish a state under the three fixed keys in one transaction.
///
/// # Errors
///
/// Returns an error if serialization or the transactional write fails. Nothing
/// is written in that case.
pub async fn publish<T>(store: &T, state: &PublishedState) -> Result<(), StoreError>
where
    T: StateStore + ?Sized,
{
    let entries = encode_state(state)?;
    for (key, value) in &entries {
        debug!(key = %key, bytes = value.len(), "Staging key");
    }

    store.set_atomic(&entries).await?;

    info!(
        posts = state.posts.len(),
        timestamp = %state.last_update.to_rfc3339(),
        "Published stats and posts"
    );
    Ok(())
}

//! Channel data source capability.
//!
//! The worker never speaks the messaging protocol itself. It consumes an
//! authenticated client through [`ChannelSource`], which resolves a channel,
//! reports its extended info and streams its most recent messages.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use thiserror::Error;

#[cfg(feature = "telegram")]
pub mod telegram;

#[cfg(feature = "telegram")]
pub use telegram::TelegramSource;

/// Errors reported by a channel data source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("channel @{0} not found")]
    NotFound(String),
    #[error("@{0} is not a broadcast channel")]
    NotAChannel(String),
    /// The server asked us to back off for `wait` before the next request.
    #[error("rate limited, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },
    #[error("session is not authorized: {0}")]
    Unauthorized(String),
    #[error("client is not connected")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A resolved channel, good for follow-up requests in the same session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: i64,
    pub title: String,
    /// Opaque access token the protocol needs alongside the id.
    pub access_hash: Option<i64>,
}

/// Extended channel information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedInfo {
    pub subscriber_count: Option<i32>,
}

/// A reaction tally on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawReaction {
    Emoji { emoticon: String, count: i32 },
    Custom { document_id: i64, count: i32 },
    /// Reaction kinds with no stable key (paid stars, empty placeholders).
    Other { count: i32 },
}

/// Media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMedia {
    Photo,
    Document {
        mime_type: Option<String>,
        round_video: bool,
    },
    WebPage,
    Other,
}

/// A channel message as delivered by the source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: i32,
    /// Message text, or the caption of a media message.
    pub text: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub replies: Option<i32>,
    pub reactions: Vec<RawReaction>,
    pub media: Option<RawMedia>,
}

impl RawMessage {
    /// A plain text message with no counters set.
    #[must_use]
    pub fn text(id: i32, text: &str, date: DateTime<Utc>) -> Self {
        Self {
            id,
            text: Some(text.to_string()),
            date: Some(date),
            views: None,
            forwards: None,
            replies: None,
            reactions: Vec::new(),
            media: None,
        }
    }
}

/// Authenticated access to channel metadata and history.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Establish the client session.
    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Tear down the client session.
    async fn disconnect(&mut self) -> Result<(), SourceError>;

    /// Resolve a public username to a broadcast channel.
    async fn resolve(&self, username: &str) -> Result<ChannelHandle, SourceError>;

    /// Fetch extended channel information.
    async fn extended_info(&self, channel: &ChannelHandle) -> Result<ExtendedInfo, SourceError>;

    /// Stream up to `limit` most recent messages, newest first.
    ///
    /// The stream is lazy and finite. Service messages are not yielded.
    fn recent_messages<'a>(
        &'a self,
        channel: &'a ChannelHandle,
        limit: usize,
    ) -> BoxStream<'a, Result<RawMessage, SourceError>>;
}

//! Recent post collection and per-message normalization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::{EXCERPT_MAX_CHARS, PERMALINK_BASE};
use crate::models::{MediaKind, PostRecord};
use crate::source::{ChannelHandle, ChannelSource, RawMedia, RawMessage, RawReaction, SourceError};

/// A message that could not be turned into a [`PostRecord`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message id {0} is not positive")]
    InvalidId(i32),
    #[error("{field} is negative ({value})")]
    NegativeCount { field: &'static str, value: i32 },
}

/// Collect up to `count` recent posts, newest first.
///
/// Messages that fail to normalize are dropped with a warning.
///
/// # Errors
///
/// Returns an error if the message stream fails; nothing collected so far is
/// returned in that case.
pub async fn collect_posts<S>(
    source: &S,
    channel: &ChannelHandle,
    username: &str,
    count: usize,
    collected_at: DateTime<Utc>,
) -> Result<Vec<PostRecord>, SourceError>
where
    S: ChannelSource + ?Sized,
{
    info!(channel = %username, count, "Collecting recent posts");

    let mut messages = source.recent_messages(channel, count);
    let mut posts = Vec::with_capacity(count);

    while let Some(message) = messages.next().await {
        let message = message?;
        match normalize_message(&message, username, collected_at) {
            Ok(post) => posts.push(post),
            Err(e) => warn!(message_id = message.id, "Failed to parse message: {e}"),
        }
    }

    info!(collected = posts.len(), "Collected posts");
    Ok(posts)
}

/// Normalize one raw message into a post record.
///
/// # Errors
///
/// Returns an error if the message carries an invalid id or negative counters.
pub fn normalize_message(
    message: &RawMessage,
    username: &str,
    collected_at: DateTime<Utc>,
) -> Result<PostRecord, ParseError> {
    if message.id <= 0 {
        return Err(ParseError::InvalidId(message.id));
    }

    let media_kind = message.media.as_ref().map(classify_media);
    let (reaction_counts, reaction_total) = tally_reactions(&message.reactions)?;

    let published_at = message.date.unwrap_or_else(|| {
        debug!(message_id = message.id, "Message has no date, using collection time");
        collected_at
    });

    Ok(PostRecord {
        id: i64::from(message.id),
        excerpt: excerpt(message.id, message.text.as_deref(), media_kind),
        published_at,
        views: counter("views", message.views)?,
        forwards: counter("forwards", message.forwards)?,
        reaction_counts,
        reaction_total,
        comment_count: counter("replies", message.replies)?,
        permalink: format!("{PERMALINK_BASE}/{username}/{}", message.id),
        has_media: media_kind.is_some(),
        media_kind,
    })
}

/// Text or caption cut to [`EXCERPT_MAX_CHARS`], or a placeholder for media-only posts.
fn excerpt(id: i32, text: Option<&str>, media_kind: Option<MediaKind>) -> String {
    match (text.filter(|t| !t.is_empty()), media_kind) {
        (Some(text), _) => text.chars().take(EXCERPT_MAX_CHARS).collect(),
        (None, Some(kind)) => format!("[{kind}] Post #{id}"),
        (None, None) => format!("Post #{id}"),
    }
}

fn classify_media(media: &RawMedia) -> MediaKind {
    match media {
        RawMedia::Photo => MediaKind::Photo,
        RawMedia::Document {
            mime_type,
            round_video,
        } => classify_document(mime_type.as_deref(), *round_video),
        RawMedia::WebPage => MediaKind::Link,
        RawMedia::Other => MediaKind::Other,
    }
}

fn classify_document(mime_type: Option<&str>, round_video: bool) -> MediaKind {
    if round_video {
        return MediaKind::VideoNote;
    }
    let mime = mime_type.unwrap_or_default().to_ascii_lowercase();
    if mime.starts_with("video/") {
        MediaKind::Video
    } else if mime.starts_with("audio/") {
        MediaKind::Audio
    } else {
        MediaKind::Document
    }
}

fn tally_reactions(reactions: &[RawReaction]) -> Result<(BTreeMap<String, u64>, u64), ParseError> {
    let mut counts = BTreeMap::new();

    for reaction in reactions {
        let (key, count) = match reaction {
            RawReaction::Emoji { emoticon, count } => (emoticon.clone(), *count),
            RawReaction::Custom { document_id, count } => (format!("custom:{document_id}"), *count),
            RawReaction::Other { .. } => continue,
        };
        *counts.entry(key).or_insert(0) += counter("reaction count", Some(count))?;
    }

    let total = counts.values().sum();
    Ok((counts, total))
}

fn counter(field: &'static str, value: Option<i32>) -> Result<u64, ParseError> {
    let value = value.unwrap_or(0);
    u64::try_from(value).map_err(|_| ParseError::NegativeCount { field, value })
}

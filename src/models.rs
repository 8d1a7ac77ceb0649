use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics for the channel.
///
/// Serialized field names are read by the API service and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channel_id: i64,
    pub username: String,
    pub title: String,
    #[serde(rename = "subscribers_count")]
    pub subscriber_count: u64,
    /// Identifier of the newest message. Deleted messages still count, so
    /// this only approximates the number of posts.
    #[serde(rename = "posts_count")]
    pub approximate_post_count: u64,
    #[serde(rename = "last_post_date")]
    pub last_post_time: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
}

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    VideoNote,
    Document,
    Link,
    Other,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::VideoNote => "video_note",
            Self::Document => "document",
            Self::Link => "link",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized channel post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    #[serde(rename = "text")]
    pub excerpt: String,
    #[serde(rename = "date")]
    pub published_at: DateTime<Utc>,
    pub views: u64,
    pub forwards: u64,
    /// Emoji literal or `custom:<document id>` mapped to its count.
    #[serde(rename = "reactions")]
    pub reaction_counts: BTreeMap<String, u64>,
    #[serde(rename = "reactions_total")]
    pub reaction_total: u64,
    #[serde(rename = "comments_count")]
    pub comment_count: u64,
    #[serde(rename = "link")]
    pub permalink: String,
    pub has_media: bool,
    #[serde(rename = "media_type")]
    pub media_kind: Option<MediaKind>,
}

/// Everything one successful cycle publishes, replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedState {
    pub snapshot: ChannelSnapshot,
    pub posts: Vec<PostRecord>,
    pub last_update: DateTime<Utc>,
}

//! Shared constants used across the worker.

/// Store key holding the channel statistics JSON document.
///
/// The three key names are read by an external API service and must not change.
pub const KEY_CHANNEL_STATS: &str = "tg:channel:stats";

/// Store key holding the JSON array of recent posts.
pub const KEY_CHANNEL_POSTS: &str = "tg:channel:posts";

/// Store key holding the RFC 3339 timestamp of the last successful publish.
pub const KEY_LAST_UPDATE: &str = "tg:last_update";

/// Maximum length of a post excerpt, in characters.
pub const EXCERPT_MAX_CHARS: usize = 200;

/// Base URL for public post permalinks.
pub const PERMALINK_BASE: &str = "https://t.me";

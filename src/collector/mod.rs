//! Collectors turning source data into the published records.

pub mod posts;
pub mod stats;

pub use posts::{collect_posts, normalize_message, ParseError};
pub use stats::collect_stats;

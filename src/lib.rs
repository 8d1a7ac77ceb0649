//! Telegram channel stats worker library.
//!
//! Periodically collects a channel's statistics and recent posts, normalizes
//! them into two JSON documents and publishes both, plus an update timestamp,
//! to Redis in one transaction for a separate API service to read.

pub mod collector;
pub mod config;
pub mod constants;
pub mod models;
pub mod source;
pub mod store;
pub mod worker;

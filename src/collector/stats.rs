//! Channel statistics collection.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::info;

use crate::models::ChannelSnapshot;
use crate::source::{ChannelHandle, ChannelSource, SourceError};

/// Collect the channel statistics snapshot.
///
/// Returns the resolved channel together with the snapshot so the caller can
/// reuse it for the post listing.
///
/// # Errors
///
/// Returns an error if the channel cannot be resolved or any request fails.
pub async fn collect_stats<S>(
    source: &S,
    username: &str,
    collected_at: DateTime<Utc>,
) -> Result<(ChannelHandle, ChannelSnapshot), SourceError>
where
    S: ChannelSource + ?Sized,
{
    info!(channel = %username, "Collecting channel stats");

    let channel = source.resolve(username).await?;
    let info = source.extended_info(&channel).await?;

    // Message ids are sequential, so the newest id stands in for a post count.
    let latest = {
        let mut newest = source.recent_messages(&channel, 1);
        newest.next().await.transpose()?
    };
    let (approximate_post_count, last_post_time) = latest.map_or((0, None), |message| {
        (u64::try_from(message.id).unwrap_or(0), message.date)
    });

    let snapshot = ChannelSnapshot {
        channel_id: channel.id,
        username: username.to_string(),
        title: channel.title.clone(),
        subscriber_count: info
            .subscriber_count
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or(0),
        approximate_post_count,
        last_post_time,
        collected_at,
    };

    info!(
        subscribers = snapshot.subscriber_count,
        approx_posts = snapshot.approximate_post_count,
        "Stats collected"
    );

    Ok((channel, snapshot))
}

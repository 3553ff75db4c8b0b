//! Chat-facing tracking operations, independent of the bot framework.

use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, SourceId},
    feed::FeedClient,
    registry::{SubscriptionChange, SubscriptionRegistry},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackOutcome {
    Created,
    AlreadyTracked,
    NotFound,
}

/// Parse a user-supplied wall reference.
///
/// Bare numbers and `public`/`club`/`event` prefixes name a community wall,
/// `id` names a user wall. A leading `https://vk.com/` is accepted.
pub fn parse_source_ref(arg: &str) -> Option<SourceId> {
    let mut s = arg.trim().trim_end_matches('/');
    for prefix in ["https://", "http://"] {
        s = s.strip_prefix(prefix).unwrap_or(s);
    }
    for prefix in ["m.", "www."] {
        s = s.strip_prefix(prefix).unwrap_or(s);
    }
    s = s.strip_prefix("vk.com/").unwrap_or(s);

    if let Some(rest) = s.strip_prefix("id") {
        return positive(rest).map(SourceId::user);
    }
    for prefix in ["public", "club", "event"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return positive(rest).map(SourceId::community);
        }
    }

    let digits = s.strip_prefix('-').unwrap_or(s);
    positive(digits).map(SourceId::community)
}

fn positive(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok().filter(|n| *n > 0)
}

/// Subscribe `destination` to `source`.
///
/// The registry lock is released while the feed is probed, so a slow feed never
/// blocks the poller. Sources another chat already tracks are not probed again.
pub async fn track_source(
    registry: &Mutex<SubscriptionRegistry>,
    feed: &dyn FeedClient,
    source: SourceId,
    destination: ChatId,
) -> Result<TrackOutcome> {
    let known = {
        let reg = registry.lock().await;
        if reg.state().is_subscribed(source, destination) {
            return Ok(TrackOutcome::AlreadyTracked);
        }
        reg.state().is_tracked(source)
    };

    if !known && !feed.probe_exists(source).await? {
        tracing::info!(source = %source, chat = destination.0, "track rejected, source not found");
        return Ok(TrackOutcome::NotFound);
    }

    let mut reg = registry.lock().await;
    let change = reg.add_subscription(source, destination);
    if change == SubscriptionChange::AlreadySubscribed {
        return Ok(TrackOutcome::AlreadyTracked);
    }
    reg.save()?;

    tracing::info!(source = %source, chat = destination.0, ?change, "source tracked");
    Ok(TrackOutcome::Created)
}

/// Returns `true` when the chat was newly added.
pub async fn enable_error_announcements(
    registry: &Mutex<SubscriptionRegistry>,
    destination: ChatId,
) -> Result<bool> {
    let mut reg = registry.lock().await;
    if !reg.add_error_announcement_target(destination) {
        return Ok(false);
    }
    reg.save()?;
    tracing::info!(chat = destination.0, "error announcements enabled");
    Ok(true)
}

pub async fn tracked_by(registry: &Mutex<SubscriptionRegistry>, destination: ChatId) -> Vec<SourceId> {
    registry.lock().await.state().sources_for(destination)
}

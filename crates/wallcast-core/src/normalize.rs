//! Raw wall posts → canonical posts, filtering out everything already delivered.

use crate::{
    domain::{CanonicalPost, SourceId},
    feed::{RawAttachment, RawImage, RawPost},
    seen::SeenStore,
    Result,
};

/// Filter `raw` (newest first, as the feed returns it) down to unseen posts.
///
/// Each new id is marked seen before its fields are derived, so a crash after this
/// point can lose a post but never deliver it twice. The store is persisted once
/// for the whole batch, and only when something changed.
pub fn normalize_batch(
    seen: &mut SeenStore,
    source: SourceId,
    raw: &[RawPost],
) -> Result<Vec<CanonicalPost>> {
    let mut out = Vec::new();

    for post in raw {
        if !seen.mark_seen(source, post.id) {
            continue;
        }
        out.push(canonicalize(source, post));
    }

    seen.persist_if_dirty()?;

    if !out.is_empty() {
        tracing::debug!(source = %source, new = out.len(), fetched = raw.len(), "new posts");
    }
    Ok(out)
}

/// Shape a single raw post. Pure; does not consult the seen-set.
pub fn canonicalize(source: SourceId, post: &RawPost) -> CanonicalPost {
    let owner = post.owner_id.unwrap_or(source.0);

    CanonicalPost {
        source_id: source,
        author_id: post.from_id.abs(),
        external_post_id: post.id,
        text: post.text.clone().filter(|t| !t.is_empty()),
        media_urls: media_urls(&post.attachments),
        permalink_url: permalink(owner, post.id.0),
        published_at_epoch_seconds: post.date,
    }
}

/// One URL per photo or video attachment, in attachment order.
pub fn media_urls(attachments: &[RawAttachment]) -> Vec<String> {
    attachments
        .iter()
        .filter_map(|att| match att {
            RawAttachment::Photo { photo } => largest(&photo.sizes),
            RawAttachment::Video { video } => video.image.last(),
            RawAttachment::Other => None,
        })
        .map(|img| img.url.clone())
        .collect()
}

/// Largest rendition by pixel area.
///
/// `max_by_key` keeps the last of equal maxima, so when dimensions are missing
/// (all zero) this degrades to the last entry, which VK lists in ascending size.
fn largest(sizes: &[RawImage]) -> Option<&RawImage> {
    sizes.iter().max_by_key(|img| img.area())
}

pub fn permalink(owner_id: i64, post_id: i64) -> String {
    format!("https://vk.com/wall{owner_id}_{post_id}")
}

//! Canonical post + author + destination → outbound message. No state.

use chrono::{DateTime, Utc};

use crate::domain::{AuthorProfile, CanonicalPost, ChatId};

pub const TITLE_MAX_CHARS: usize = 250;

/// Messenger-neutral rendering of a post. Adapters decide the visual layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundPost {
    pub title: Option<String>,
    pub title_url: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author_name: String,
    pub author_url: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: ChatId,
    pub post: OutboundPost,
}

pub fn compose(post: &CanonicalPost, author: &AuthorProfile, destination: ChatId) -> OutboundMessage {
    OutboundMessage {
        destination,
        post: render(post, author),
    }
}

pub fn render(post: &CanonicalPost, author: &AuthorProfile) -> OutboundPost {
    let (title, body) = match post.text.as_deref() {
        Some(text) => split_title(text),
        None => (None, None),
    };

    OutboundPost {
        title,
        title_url: post.permalink_url.clone(),
        body,
        image_url: post.media_urls.first().cloned(),
        thumbnail_url: Some(author.avatar_url.clone()).filter(|u| !u.is_empty()),
        author_name: author.display_name.clone(),
        author_url: author.profile_url.clone(),
        timestamp: DateTime::<Utc>::from_timestamp(post.published_at_epoch_seconds, 0),
    }
}

/// Every (post × destination) pair, oldest post first.
pub fn fan_out(
    posts: &[CanonicalPost],
    author: &AuthorProfile,
    destinations: &[ChatId],
) -> Vec<OutboundMessage> {
    let mut ordered: Vec<&CanonicalPost> = posts.iter().collect();
    ordered.sort_by_key(|p| (p.published_at_epoch_seconds, p.external_post_id));

    ordered
        .into_iter()
        .flat_map(|post| {
            destinations
                .iter()
                .map(move |dest| compose(post, author, *dest))
        })
        .collect()
}

/// First line (bounded) becomes the title, the remaining lines the body.
fn split_title(text: &str) -> (Option<String>, Option<String>) {
    let mut lines = text.lines();
    let title = lines
        .next()
        .map(|l| l.chars().take(TITLE_MAX_CHARS).collect::<String>())
        .filter(|l| !l.trim().is_empty());
    let body = lines.collect::<Vec<_>>().join("\n");
    let body = Some(body).filter(|b| !b.trim().is_empty());
    (title, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PostId, SourceId};

    fn author() -> AuthorProfile {
        AuthorProfile {
            id: 100,
            display_name: "Football Club".to_string(),
            avatar_url: "https://img/avatar.jpg".to_string(),
            profile_url: "https://vk.com/public100".to_string(),
        }
    }

    fn post(id: i64, date: i64, text: Option<&str>, media: &[&str]) -> CanonicalPost {
        CanonicalPost {
            source_id: SourceId(-100),
            author_id: 100,
            external_post_id: PostId(id),
            text: text.map(str::to_string),
            media_urls: media.iter().map(|s| s.to_string()).collect(),
            permalink_url: format!("https://vk.com/wall-100_{id}"),
            published_at_epoch_seconds: date,
        }
    }

    #[test]
    fn splits_title_and_body() {
        let msg = compose(
            &post(42, 1700000000, Some("Goal!\nDetails here\nmore"), &["a.jpg", "b.jpg"]),
            &author(),
            ChatId(555),
        );

        assert_eq!(msg.destination, ChatId(555));
        assert_eq!(msg.post.title.as_deref(), Some("Goal!"));
        assert_eq!(msg.post.body.as_deref(), Some("Details here\nmore"));
        assert_eq!(msg.post.title_url, "https://vk.com/wall-100_42");
        assert_eq!(msg.post.image_url.as_deref(), Some("a.jpg"));
        assert_eq!(msg.post.thumbnail_url.as_deref(), Some("https://img/avatar.jpg"));
        assert_eq!(msg.post.author_name, "Football Club");
        assert_eq!(msg.post.author_url, "https://vk.com/public100");
        assert_eq!(msg.post.timestamp.map(|t| t.timestamp()), Some(1700000000));
    }

    #[test]
    fn title_is_bounded() {
        let long = "x".repeat(400);
        let out = render(&post(1, 0, Some(&long), &[]), &author());
        assert_eq!(out.title.map(|t| t.chars().count()), Some(TITLE_MAX_CHARS));
        assert!(out.body.is_none());
    }

    #[test]
    fn textless_post_has_no_title_or_body() {
        let out = render(&post(1, 0, None, &[]), &author());
        assert!(out.title.is_none());
        assert!(out.body.is_none());
        assert!(out.image_url.is_none());
    }

    #[test]
    fn compose_is_idempotent() {
        let p = post(1, 10, Some("a\nb"), &["m"]);
        assert_eq!(compose(&p, &author(), ChatId(1)), compose(&p, &author(), ChatId(1)));
    }

    #[test]
    fn fan_out_covers_every_pair_oldest_first() {
        let posts = vec![post(3, 300, Some("new"), &[]), post(2, 200, Some("old"), &[])];
        let out = fan_out(&posts, &author(), &[ChatId(1), ChatId(2)]);

        let pairs: Vec<(Option<&str>, ChatId)> = out
            .iter()
            .map(|m| (m.post.title.as_deref(), m.destination))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some("old"), ChatId(1)),
                (Some("old"), ChatId(2)),
                (Some("new"), ChatId(1)),
                (Some("new"), ChatId(2)),
            ]
        );
    }
}

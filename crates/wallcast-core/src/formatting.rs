//! Telegram HTML rendering for forwarded posts and bot replies.

use crate::dispatch::OutboundPost;

const ELLIPSIS: char = '…';

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape `text`, stopping before the escaped output exceeds `max_chars`.
///
/// Cuts happen on whole characters, never inside an entity. A cut output ends
/// with an ellipsis that counts toward the budget.
pub fn escape_html_bounded(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }

    let escaped = escape_html(text);
    if escaped.chars().count() <= max_chars {
        return escaped;
    }

    let budget = max_chars - 1;
    let mut out = String::new();
    let mut used = 0usize;
    for c in text.chars() {
        let piece = escape_html(c.encode_utf8(&mut [0u8; 4]));
        let n = piece.chars().count();
        if used + n > budget {
            break;
        }
        out.push_str(&piece);
        used += n;
    }
    out.push(ELLIPSIS);
    out
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars.saturating_sub(1)).collect::<String>();
    out.push(ELLIPSIS);
    out
}

/// Render a post as Telegram HTML no longer than `limit` characters.
///
/// Title (linked to the post) and the attribution footer are always kept; the
/// body absorbs the cut. An escaped title may use at most half of the room the
/// footer leaves.
pub fn post_html(post: &OutboundPost, limit: usize) -> String {
    let mut footer = format!(
        "<a href=\"{}\">{}</a>",
        escape_html(&post.author_url),
        escape_html(&post.author_name)
    );
    if let Some(ts) = post.timestamp {
        footer.push_str(&format!(" · {}", ts.format("%Y-%m-%d %H:%M UTC")));
    }

    let url = escape_html(&post.title_url);
    let header = match &post.title {
        Some(title) => {
            let markup = format!("<b><a href=\"{url}\"></a></b>");
            let room = limit.saturating_sub(markup.chars().count() + footer.chars().count() + 2) / 2;
            format!("<b><a href=\"{url}\">{}</a></b>", escape_html_bounded(title, room))
        }
        None => format!("<a href=\"{url}\">Open post</a>"),
    };

    let fixed = header.chars().count() + footer.chars().count() + 2;
    let body = post.body.as_deref().and_then(|b| {
        let room = limit.saturating_sub(fixed + 2);
        Some(escape_html_bounded(b, room)).filter(|s| !s.is_empty())
    });

    match body {
        Some(body) => format!("{header}\n\n{body}\n\n{footer}"),
        None => format!("{header}\n\n{footer}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn post(body: Option<&str>) -> OutboundPost {
        OutboundPost {
            title: Some("Goal! <3".to_string()),
            title_url: "https://vk.com/wall-100_42".to_string(),
            body: body.map(str::to_string),
            image_url: None,
            thumbnail_url: None,
            author_name: "FC & Co".to_string(),
            author_url: "https://vk.com/public100".to_string(),
            timestamp: DateTime::<Utc>::from_timestamp(1700000000, 0),
        }
    }

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn bounded_escape_never_splits_entities() {
        let out = escape_html_bounded("&&&&&", 12);
        assert_eq!(out, "&amp;&amp;…");
        assert_eq!(escape_html_bounded("short", 100), "short");
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        assert_eq!(truncate_text("abcdef", 4), "abc…");
        assert_eq!(truncate_text("abc", 4), "abc");
    }

    #[test]
    fn renders_title_body_and_attribution() {
        let html = post_html(&post(Some("Details here")), 4096);
        assert_eq!(
            html,
            "<b><a href=\"https://vk.com/wall-100_42\">Goal! &lt;3</a></b>\n\n\
             Details here\n\n\
             <a href=\"https://vk.com/public100\">FC &amp; Co</a> · 2023-11-14 22:13 UTC"
        );
    }

    #[test]
    fn long_body_is_cut_to_the_limit() {
        let body = "word ".repeat(500);
        let html = post_html(&post(Some(&body)), 1024);
        assert!(html.chars().count() <= 1024);
        assert!(html.contains('…'));
        assert!(html.ends_with("22:13 UTC"));
    }

    #[test]
    fn title_full_of_entities_stays_under_caption_limit() {
        let mut p = post(Some("body text"));
        p.title = Some("&<".repeat(125));
        let html = post_html(&p, 1024);
        assert!(html.chars().count() <= 1024, "{}", html.chars().count());
        assert!(html.starts_with("<b><a href=\"https://vk.com/wall-100_42\">&amp;&lt;"));
        assert!(html.contains("…</a></b>"));
        assert!(html.ends_with("22:13 UTC"));
    }

    #[test]
    fn untitled_post_links_generic_label() {
        let mut p = post(None);
        p.title = None;
        let html = post_html(&p, 1024);
        assert!(html.starts_with("<a href=\"https://vk.com/wall-100_42\">Open post</a>"));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram chat id (numeric). Every destination is a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Wall owner id in VK's own sign convention.
///
/// Negative ids are community (public page / group) walls, positive ids are user
/// walls. The registry, the seen-set keys and feed calls all use this form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl SourceId {
    pub fn community(id: i64) -> Self {
        Self(-id.abs())
    }

    pub fn user(id: i64) -> Self {
        Self(id.abs())
    }

    pub fn is_community(self) -> bool {
        self.0 < 0
    }

    /// Non-negative id without the kind marker.
    pub fn bare(self) -> i64 {
        self.0.abs()
    }

    /// Key used by the seen-posts file.
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Post id, unique within one wall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Author metadata shown next to every forwarded post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorProfile {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: String,
    pub profile_url: String,
}

/// Platform-independent representation of a wall post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalPost {
    pub source_id: SourceId,
    pub author_id: i64,
    pub external_post_id: PostId,
    pub text: Option<String>,
    pub media_urls: Vec<String>,
    pub permalink_url: String,
    pub published_at_epoch_seconds: i64,
}

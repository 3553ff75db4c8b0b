//! Feed source port and the raw wall post shape it returns.
//!
//! The raw types follow the VK `wall.get` item layout; only the fields the
//! normalizer needs are decoded.

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    domain::{AuthorProfile, PostId, SourceId},
    Result,
};

/// Hexagonal port for the wall feed.
///
/// Every method fails with [`crate::Error::FeedUnavailable`] on transport, auth or
/// rate-limit problems. An empty wall is `Ok(vec![])`, and a source that does not
/// exist is `Ok(false)` from [`FeedClient::probe_exists`].
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch_recent_posts(&self, source: SourceId, count: u32) -> Result<Vec<RawPost>>;

    async fn fetch_author_profile(&self, source: SourceId) -> Result<AuthorProfile>;

    async fn probe_exists(&self, source: SourceId) -> Result<bool>;
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawPost {
    pub id: PostId,
    pub from_id: i64,
    #[serde(default)]
    pub owner_id: Option<i64>,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawAttachment {
    Photo { photo: RawPhoto },
    Video { video: RawVideo },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawPhoto {
    #[serde(default)]
    pub sizes: Vec<RawImage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawVideo {
    #[serde(default)]
    pub image: Vec<RawImage>,
}

/// One rendition of an image. Dimensions are `0` when the API omits them.
#[derive(Clone, Debug, Deserialize)]
pub struct RawImage {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl RawImage {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

//! VK API adapter (wall feed).
//!
//! Implements [`FeedClient`] over the plain HTTP method endpoint: `wall.get` for
//! posts, `groups.getById` / `users.get` for author metadata.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};

use wallcast_core::{
    domain::{AuthorProfile, SourceId},
    errors::Error,
    feed::{FeedClient, RawPost},
    Result,
};

const API_BASE: &str = "https://api.vk.com/method/";

/// API error codes meaning "this wall does not exist or is not readable".
///
/// 15 access denied, 18 user deleted/banned, 30 private profile, 100 invalid
/// parameter, 113 invalid user id, 203 access to group denied.
const NOT_FOUND_CODES: &[i64] = &[15, 18, 30, 100, 113, 203];

#[derive(Clone, Debug)]
pub struct VkClient {
    token: String,
    api_version: String,
    base_url: String,
    http: reqwest::Client,
}

impl VkClient {
    pub fn new(
        token: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("vk http client: {e}")))?;
        Ok(Self {
            token: token.into(),
            api_version: api_version.into(),
            base_url: API_BASE.to_string(),
            http,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<T, VkCallError> {
        let mut form: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push(("access_token", self.token.as_str()));
        form.push(("v", self.api_version.as_str()));

        let resp = self
            .http
            .post(format!("{}{method}", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| VkCallError::Transport(format!("{method}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| VkCallError::Transport(format!("{method}: {e}")))?;
        if !status.is_success() {
            return Err(VkCallError::Transport(format!(
                "{method}: http {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        tracing::debug!(method, bytes = body.len(), "vk call ok");
        decode_envelope(method, &body)
    }

    async fn community_profile(&self, source: SourceId) -> Result<AuthorProfile> {
        let groups: GroupsResponse = self
            .call(
                "groups.getById",
                &[
                    ("group_id", source.bare().to_string()),
                    ("fields", "photo_100".to_string()),
                ],
            )
            .await
            .map_err(VkCallError::into_feed_error)?;

        let group = groups
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| Error::FeedUnavailable(format!("groups.getById: {source} not returned")))?;

        Ok(AuthorProfile {
            id: group.id.abs(),
            display_name: group.name,
            avatar_url: group.photo_100,
            profile_url: format!("https://vk.com/public{}", group.id.abs()),
        })
    }

    async fn user_profile(&self, source: SourceId) -> Result<AuthorProfile> {
        let users: Vec<User> = self
            .call(
                "users.get",
                &[
                    ("user_ids", source.bare().to_string()),
                    ("fields", "photo_100".to_string()),
                ],
            )
            .await
            .map_err(VkCallError::into_feed_error)?;

        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| Error::FeedUnavailable(format!("users.get: {source} not returned")))?;

        Ok(AuthorProfile {
            id: user.id.abs(),
            display_name: format!("{} {}", user.first_name, user.last_name)
                .trim()
                .to_string(),
            avatar_url: user.photo_100,
            profile_url: format!("https://vk.com/id{}", user.id.abs()),
        })
    }

    async fn wall_get(&self, source: SourceId, count: u32) -> std::result::Result<WallResponse, VkCallError> {
        self.call(
            "wall.get",
            &[
                ("owner_id", source.0.to_string()),
                ("count", count.to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl FeedClient for VkClient {
    async fn fetch_recent_posts(&self, source: SourceId, count: u32) -> Result<Vec<RawPost>> {
        let wall = self
            .wall_get(source, count)
            .await
            .map_err(VkCallError::into_feed_error)?;
        Ok(wall.items)
    }

    async fn fetch_author_profile(&self, source: SourceId) -> Result<AuthorProfile> {
        if source.is_community() {
            self.community_profile(source).await
        } else {
            self.user_profile(source).await
        }
    }

    async fn probe_exists(&self, source: SourceId) -> Result<bool> {
        match self.wall_get(source, 1).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                tracing::debug!(source = %source, error = %e, "probe: wall not readable");
                Ok(false)
            }
            Err(e) => Err(e.into_feed_error()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VkCallError {
    Transport(String),
    Api { code: i64, message: String },
}

impl VkCallError {
    fn is_not_found(&self) -> bool {
        matches!(self, VkCallError::Api { code, .. } if NOT_FOUND_CODES.contains(code))
    }

    fn into_feed_error(self) -> Error {
        Error::FeedUnavailable(self.to_string())
    }
}

impl std::fmt::Display for VkCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VkCallError::Transport(msg) => write!(f, "{msg}"),
            VkCallError::Api { code, message } => write!(f, "vk error {code}: {message}"),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

fn decode_envelope<T: DeserializeOwned>(
    method: &str,
    body: &str,
) -> std::result::Result<T, VkCallError> {
    let env: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| VkCallError::Transport(format!("{method}: invalid response: {e}")))?;

    if let Some(err) = env.error {
        return Err(VkCallError::Api {
            code: err.error_code,
            message: err.error_msg,
        });
    }
    env.response
        .ok_or_else(|| VkCallError::Transport(format!("{method}: empty response")))
}

#[derive(Debug, Deserialize)]
struct WallResponse {
    #[serde(default)]
    items: Vec<RawPost>,
}

/// `groups.getById` returns a bare array on older API versions and
/// `{"groups": [...]}` from 5.194 on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupsResponse {
    List(Vec<Group>),
    Wrapped { groups: Vec<Group> },
}

impl GroupsResponse {
    fn into_vec(self) -> Vec<Group> {
        match self {
            GroupsResponse::List(g) | GroupsResponse::Wrapped { groups: g } => g,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Group {
    id: i64,
    name: String,
    #[serde(default)]
    photo_100: String,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    photo_100: String,
}

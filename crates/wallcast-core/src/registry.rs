//! Tracked sources and their subscriber chats, persisted as `config.json`.
//!
//! The in-memory state is the single source of truth during a run. Mutations do not
//! touch the disk; callers batch them and call [`SubscriptionRegistry::save`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, SourceId},
    store, Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSource {
    pub id: SourceId,
    #[serde(default)]
    pub post_subscribers: Vec<ChatId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryState {
    pub tracked_publics: Vec<TrackedSource>,
    pub error_announcement_channels: Vec<ChatId>,
}

/// What [`RegistryState::add_subscription`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionChange {
    NewSource,
    NewSubscriber,
    AlreadySubscribed,
}

impl SubscriptionChange {
    pub fn is_new(self) -> bool {
        !matches!(self, SubscriptionChange::AlreadySubscribed)
    }
}

impl RegistryState {
    pub fn add_subscription(&mut self, source: SourceId, destination: ChatId) -> SubscriptionChange {
        match self.tracked_publics.iter_mut().find(|t| t.id == source) {
            Some(tracked) if tracked.post_subscribers.contains(&destination) => {
                SubscriptionChange::AlreadySubscribed
            }
            Some(tracked) => {
                tracked.post_subscribers.push(destination);
                SubscriptionChange::NewSubscriber
            }
            None => {
                self.tracked_publics.push(TrackedSource {
                    id: source,
                    post_subscribers: vec![destination],
                });
                SubscriptionChange::NewSource
            }
        }
    }

    pub fn add_error_announcement_target(&mut self, destination: ChatId) -> bool {
        if self.error_announcement_channels.contains(&destination) {
            return false;
        }
        self.error_announcement_channels.push(destination);
        true
    }

    pub fn is_tracked(&self, source: SourceId) -> bool {
        self.tracked_publics.iter().any(|t| t.id == source)
    }

    pub fn is_subscribed(&self, source: SourceId, destination: ChatId) -> bool {
        self.tracked_publics
            .iter()
            .any(|t| t.id == source && t.post_subscribers.contains(&destination))
    }

    pub fn subscribers_of(&self, source: SourceId) -> Vec<ChatId> {
        self.tracked_publics
            .iter()
            .find(|t| t.id == source)
            .map(|t| t.post_subscribers.clone())
            .unwrap_or_default()
    }

    pub fn sources_for(&self, destination: ChatId) -> Vec<SourceId> {
        self.tracked_publics
            .iter()
            .filter(|t| t.post_subscribers.contains(&destination))
            .map(|t| t.id)
            .collect()
    }

    pub fn tracked_ids(&self) -> Vec<SourceId> {
        self.tracked_publics.iter().map(|t| t.id).collect()
    }

    /// Build the state from the on-disk shape, merging duplicate entries and
    /// migrating the older `channels_to_post` + bare id list layout.
    ///
    /// Returns `true` as the second element when the file needs rewriting.
    fn from_file(file: RegistryFile) -> (Self, bool) {
        let mut state = RegistryState::default();
        let mut rewrite = false;

        for entry in file.tracked_publics {
            match entry {
                TrackedEntry::Current(t) => {
                    if state.is_tracked(t.id) {
                        rewrite = true;
                    }
                    if t.post_subscribers.is_empty() && !state.is_tracked(t.id) {
                        state.tracked_publics.push(t);
                        continue;
                    }
                    for dest in t.post_subscribers {
                        rewrite |= !state.add_subscription(t.id, dest).is_new();
                    }
                }
                TrackedEntry::Legacy(public_id) => {
                    rewrite = true;
                    let source = SourceId::community(public_id);
                    if file.channels_to_post.is_empty() && !state.is_tracked(source) {
                        state.tracked_publics.push(TrackedSource {
                            id: source,
                            post_subscribers: Vec::new(),
                        });
                    }
                    for dest in &file.channels_to_post {
                        state.add_subscription(source, *dest);
                    }
                }
            }
        }

        for dest in file.error_announcement_channels {
            rewrite |= !state.add_error_announcement_target(dest);
        }

        (state, rewrite)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    tracked_publics: Vec<TrackedEntry>,
    #[serde(default)]
    error_announcement_channels: Vec<ChatId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    channels_to_post: Vec<ChatId>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum TrackedEntry {
    Current(TrackedSource),
    Legacy(i64),
}

/// The registry as shared between the poller and command handlers.
pub type SharedRegistry = Arc<Mutex<SubscriptionRegistry>>;

#[derive(Debug)]
pub struct SubscriptionRegistry {
    path: PathBuf,
    state: RegistryState,
}

impl SubscriptionRegistry {
    /// Load the registry, creating an empty file if none exists.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file: RegistryFile = store::load_or_init(&path)?;
        let (state, rewrite) = RegistryState::from_file(file);

        let registry = Self { path, state };
        if rewrite {
            tracing::info!(path = %registry.path.display(), "normalizing registry file");
            registry.save()?;
        }

        tracing::info!(
            path = %registry.path.display(),
            sources = registry.state.tracked_publics.len(),
            error_channels = registry.state.error_announcement_channels.len(),
            "loaded subscription registry"
        );
        Ok(registry)
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    /// Persist the full state (overwrite, no merge with what is on disk).
    pub fn save(&self) -> Result<()> {
        store::write_atomic(&self.path, &self.state)
    }

    pub fn add_subscription(&mut self, source: SourceId, destination: ChatId) -> SubscriptionChange {
        self.state.add_subscription(source, destination)
    }

    pub fn add_error_announcement_target(&mut self, destination: ChatId) -> bool {
        self.state.add_error_announcement_target(destination)
    }
}

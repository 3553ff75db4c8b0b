//! Persisted set of post ids already delivered, keyed per tracked source.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use crate::{
    domain::{PostId, SourceId},
    store, Result,
};

/// On-disk shape: `{"-100": [41, 42]}`.
type SeenMap = BTreeMap<String, BTreeSet<PostId>>;

#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    seen: SeenMap,
    dirty: bool,
}

impl SeenStore {
    /// Load the store, creating an empty backing file if there is none.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let seen: SeenMap = store::load_or_init(&path)?;
        tracing::info!(
            path = %path.display(),
            sources = seen.len(),
            posts = seen.values().map(|s| s.len()).sum::<usize>(),
            "loaded seen posts"
        );
        Ok(Self {
            path,
            seen,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_seen(&self, source: SourceId, post: PostId) -> bool {
        self.seen
            .get(&source.key())
            .map(|ids| ids.contains(&post))
            .unwrap_or(false)
    }

    /// Record `post` as delivered. Returns `false` if it was already present.
    pub fn mark_seen(&mut self, source: SourceId, post: PostId) -> bool {
        let added = self.seen.entry(source.key()).or_default().insert(post);
        self.dirty |= added;
        added
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Total number of recorded posts across all sources.
    pub fn len(&self) -> usize {
        self.seen.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn seen_for(&self, source: SourceId) -> Vec<PostId> {
        self.seen
            .get(&source.key())
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Atomically replace the backing file with the current contents.
    pub fn persist(&mut self) -> Result<()> {
        store::write_atomic(&self.path, &self.seen)?;
        self.dirty = false;
        Ok(())
    }

    pub fn persist_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }
}

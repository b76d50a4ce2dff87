//! Topic/task/consent catalogs: plain JSON documents loaded at startup and
//! reloadable on demand. Selection is random, matching the arena's policy of
//! handing every pairing a fresh topic and two distinct tasks.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::error::{ArenaError, ArenaResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CatalogDocument {
    #[serde(default)]
    topics: Vec<Topic>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    consent_text: String,
}

struct CatalogState {
    topics: Vec<Topic>,
    tasks: Vec<Task>,
    consent_text: String,
}

/// Holds the loaded catalog documents behind a single lock; reload swaps the
/// whole snapshot in one go so readers never observe a half-updated catalog.
pub struct CatalogStore {
    path: PathBuf,
    state: RwLock<CatalogState>,
}

impl CatalogStore {
    /// Loads the catalog from `path`. A missing file degrades to an empty
    /// catalog rather than a startup failure — pairing will simply report
    /// "no topics or tasks available" until an admin populates it.
    pub fn load(path: impl Into<PathBuf>) -> ArenaResult<Self> {
        let path = path.into();
        let doc = Self::read_document(&path)?;
        Ok(Self::from_document(path, doc))
    }

    /// Builds an empty catalog rooted at `path`, without touching the
    /// filesystem. Used when a catalog file exists but fails to parse, so
    /// the server can still boot and report "no topics or tasks available"
    /// instead of refusing to start.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::from_document(path.into(), CatalogDocument::default())
    }

    fn from_document(path: PathBuf, doc: CatalogDocument) -> Self {
        Self {
            path,
            state: RwLock::new(CatalogState {
                topics: doc.topics,
                tasks: doc.tasks,
                consent_text: doc.consent_text,
            }),
        }
    }

    fn read_document(path: &Path) -> ArenaResult<CatalogDocument> {
        if !path.exists() {
            return Ok(CatalogDocument::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let doc: CatalogDocument = serde_json::from_str(&raw)?;
        Ok(doc)
    }

    /// Re-reads the catalog file from disk, replacing the in-memory snapshot.
    pub fn reload(&self) -> ArenaResult<()> {
        let doc = Self::read_document(&self.path)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.topics = doc.topics;
        state.tasks = doc.tasks;
        state.consent_text = doc.consent_text;
        Ok(())
    }

    pub fn consent_text(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .consent_text
            .clone()
    }

    /// Picks one topic uniformly at random.
    pub fn random_topic(&self) -> ArenaResult<Topic> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .topics
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ArenaError::EmptyCatalog("topics".to_string()))
    }

    /// Picks `count` distinct tasks uniformly at random without replacement.
    pub fn random_tasks(&self, count: usize) -> ArenaResult<Vec<Task>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.tasks.len() < count {
            return Err(ArenaError::EmptyCatalog("tasks".to_string()));
        }
        let mut rng = rand::thread_rng();
        Ok(state
            .tasks
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect())
    }
}

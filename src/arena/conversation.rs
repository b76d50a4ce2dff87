//! Durable per-session conversation log. Write-through: every mutation is
//! flushed to disk before the call returns, trading a disk write per turn
//! for crash-survivability (a lost message is a dataset loss at this
//! throughput, the trade is worth it).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use super::error::{ArenaError, ArenaResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub session_id: String,
    pub topic: String,
    pub participants: Vec<Participant>,
    pub messages: Vec<ConversationMessage>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

pub struct ConversationLog {
    data_dir: PathBuf,
    cache: RwLock<HashMap<String, Conversation>>,
}

impl ConversationLog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn file_path(&self, session_id: &str) -> PathBuf {
        self.data_dir.join(format!("{session_id}.json"))
    }

    fn write_to_disk(&self, conversation: &Conversation) -> ArenaResult<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.file_path(&conversation.session_id);
        let serialized = serde_json::to_string_pretty(conversation)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    fn read_from_disk(&self, session_id: &str) -> Option<Conversation> {
        let path = self.file_path(session_id);
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Creates a new conversation record, caches it, and flushes it to disk
    /// synchronously.
    pub async fn create(
        &self,
        session_id: impl Into<String>,
        topic: impl Into<String>,
        participants: Vec<Participant>,
    ) -> ArenaResult<()> {
        let session_id = session_id.into();
        let conversation = Conversation {
            session_id: session_id.clone(),
            topic: topic.into(),
            participants,
            messages: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        };
        self.write_to_disk(&conversation)?;
        self.cache.write().await.insert(session_id, conversation);
        Ok(())
    }

    /// Appends a message and flushes. If the session isn't cached, attempts
    /// to hydrate it from disk first; a still-missing session is logged and
    /// dropped rather than treated as fatal — a stray write must never
    /// crash the dispatcher.
    pub async fn append(
        &self,
        session_id: &str,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> ArenaResult<()> {
        let mut cache = self.cache.write().await;
        if !cache.contains_key(session_id) {
            if let Some(hydrated) = self.read_from_disk(session_id) {
                cache.insert(session_id.to_string(), hydrated);
            } else {
                warn!(session_id, "append to unknown conversation, dropping");
                return Ok(());
            }
        }

        let conversation = cache.get_mut(session_id).expect("just inserted or present");
        if conversation.ended_at.is_some() {
            return Err(ArenaError::ConversationEnded(session_id.to_string()));
        }
        conversation.messages.push(ConversationMessage {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        });
        self.write_to_disk(conversation)?;
        Ok(())
    }

    /// Marks the conversation ended, flushes, and evicts it from the cache.
    pub async fn end(&self, session_id: &str) -> ArenaResult<()> {
        let mut cache = self.cache.write().await;
        let Some(mut conversation) = cache.remove(session_id) else {
            if let Some(mut hydrated) = self.read_from_disk(session_id) {
                hydrated.ended_at = Some(Utc::now());
                self.write_to_disk(&hydrated)?;
                return Ok(());
            }
            return Err(ArenaError::ConversationNotFound(session_id.to_string()));
        };
        conversation.ended_at = Some(Utc::now());
        self.write_to_disk(&conversation)?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn get(&self, session_id: &str) -> Option<Conversation> {
        self.cache.read().await.get(session_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn participants() -> Vec<Participant> {
        vec![
            Participant {
                user_id: "user_a".to_string(),
                task: "task-1".to_string(),
            },
            Participant {
                user_id: "user_b".to_string(),
                task: "task-2".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn create_flushes_to_disk_immediately() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path());
        log.create("sess-1", "topic", participants()).await.unwrap();
        let path = dir.path().join("sess-1.json");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn append_persists_canonical_content() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path());
        log.create("sess-1", "topic", participants()).await.unwrap();
        log.append("sess-1", "user_a", "<think>considering carefully</think>Hi")
            .await
            .unwrap();

        let on_disk = log.read_from_disk("sess-1").unwrap();
        assert_eq!(on_disk.messages.len(), 1);
        assert_eq!(
            on_disk.messages[0].content,
            "<think>considering carefully</think>Hi"
        );
    }

    #[tokio::test]
    async fn append_hydrates_from_disk_when_not_cached() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path());
        log.create("sess-1", "topic", participants()).await.unwrap();
        log.cache.write().await.clear();

        log.append("sess-1", "user_a", "<think>ok</think>hi").await.unwrap();
        assert_eq!(log.get("sess-1").await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn append_to_unknown_session_is_dropped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path());
        log.append("ghost", "user_a", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn end_sets_ended_at_and_evicts_cache() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path());
        log.create("sess-1", "topic", participants()).await.unwrap();
        log.end("sess-1").await.unwrap();
        assert!(log.get("sess-1").await.is_none());

        let on_disk = log.read_from_disk("sess-1").unwrap();
        assert!(on_disk.ended_at.is_some());
    }

    #[tokio::test]
    async fn append_after_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path());
        log.create("sess-1", "topic", participants()).await.unwrap();
        log.end("sess-1").await.unwrap();
        // After end, the conversation is hydrated fresh from disk with
        // ended_at set, so a further append must be rejected.
        let result = log.append("sess-1", "user_a", "too late").await;
        assert!(result.is_err());
    }
}

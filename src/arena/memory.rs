//! Bounded conversation memory kept by a single [`AIParticipant`
//! `](super::ai_participant::AIParticipant). Distinct from the durable
//! [`ConversationLog`](super::conversation::ConversationLog): this is an
//! in-process working set capped at a fixed number of turns, oldest first
//! to drop.

use chrono::{DateTime, Utc};

pub const DEFAULT_MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryRole {
    Partner,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub role: MemoryRole,
    pub speech: String,
    pub think: Option<String>,
    pub sentiment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    entries: Vec<MemoryEntry>,
    max_entries: usize,
    pub topic: String,
    pub task: String,
    pub session_id: String,
}

impl ConversationMemory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            topic: String::new(),
            task: String::new(),
            session_id: String::new(),
        }
    }

    pub fn set_context(&mut self, topic: impl Into<String>, task: impl Into<String>, session_id: impl Into<String>) {
        self.topic = topic.into();
        self.task = task.into();
        self.session_id = session_id.into();
    }

    fn push(&mut self, entry: MemoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn add_partner_message(&mut self, speech: impl Into<String>, sentiment: impl Into<String>) {
        self.push(MemoryEntry {
            role: MemoryRole::Partner,
            speech: speech.into(),
            think: None,
            sentiment: Some(sentiment.into()),
            timestamp: Utc::now(),
        });
    }

    pub fn add_ai_message(&mut self, think: impl Into<String>, speech: impl Into<String>) {
        self.push(MemoryEntry {
            role: MemoryRole::Assistant,
            speech: speech.into(),
            think: Some(think.into()),
            sentiment: None,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn turn_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.topic.clear();
        self.task.clear();
        self.session_id.clear();
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_drop_silently_past_the_cap() {
        let mut memory = ConversationMemory::new(3);
        for i in 0..5 {
            memory.add_partner_message(format!("msg {i}"), "neutral");
        }
        assert_eq!(memory.turn_count(), 3);
        assert_eq!(memory.entries()[0].speech, "msg 2");
        assert_eq!(memory.entries()[2].speech, "msg 4");
    }

    #[test]
    fn default_cap_is_fifty() {
        let memory = ConversationMemory::default();
        assert_eq!(memory.max_entries, 50);
    }

    #[test]
    fn clear_resets_entries_and_context() {
        let mut memory = ConversationMemory::new(10);
        memory.set_context("topic", "task", "sess-1");
        memory.add_ai_message("t", "s");
        memory.clear();
        assert_eq!(memory.turn_count(), 0);
        assert_eq!(memory.topic, "");
    }
}

//! Authoritative map of sessions, connections, and AI sessions. All
//! mutating operations are serialized under a single exclusive lock; reads
//! take a snapshot. This is the sole authority for pairing state — every
//! mutation to `paired`/`partner_id`/`session_id` goes through one of the
//! atomic methods below, never through ad hoc field writes elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;

use super::protocol::ServerFrame;

/// A live connection handle. Implemented by the transport layer (a
/// WebSocket sink in production, an in-memory recorder in tests).
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, frame: &ServerFrame) -> bool;
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub consented: bool,
    pub paired: bool,
    pub partner_id: Option<String>,
    pub session_id: Option<String>,
    pub task: Option<String>,
    pub is_ai_partner: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

impl Session {
    fn fresh(user_id: String) -> Self {
        Self {
            user_id,
            consented: false,
            paired: false,
            partner_id: None,
            session_id: None,
            task: None,
            is_ai_partner: false,
            last_activity: None,
        }
    }

    fn clear_pairing(&mut self) {
        self.paired = false;
        self.partner_id = None;
        self.session_id = None;
        self.task = None;
        self.is_ai_partner = false;
    }
}

#[derive(Debug, Clone)]
pub struct AISession {
    pub ai_id: String,
    pub partner_id: String,
    pub session_id: String,
    pub persona_id: String,
    pub provider: String,
    pub model: String,
    pub topic: String,
    pub task: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

struct TableState {
    connections: HashMap<String, Arc<dyn Connection>>,
    sessions: HashMap<String, Session>,
    ai_sessions: HashMap<String, AISession>,
}

pub struct SessionTable {
    state: Mutex<TableState>,
}

fn random_hex_id(prefix: &str, hex_len: usize) -> String {
    const CHARS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..hex_len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                connections: HashMap::new(),
                sessions: HashMap::new(),
                ai_sessions: HashMap::new(),
            }),
        }
    }

    /// Mints a fresh user id, inserts the connection and a fresh session.
    pub async fn connect(&self, conn: Arc<dyn Connection>) -> String {
        let mut state = self.state.lock().await;
        let user_id = loop {
            let candidate = random_hex_id("user_", 8);
            if !state.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        state.connections.insert(user_id.clone(), conn);
        state
            .sessions
            .insert(user_id.clone(), Session::fresh(user_id.clone()));
        user_id
    }

    /// Removes the connection and session; returns the partner the session
    /// thought it had, for downstream notification.
    pub async fn disconnect(&self, user_id: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        state.connections.remove(user_id);
        state.sessions.remove(user_id).and_then(|s| s.partner_id)
    }

    pub async fn get_session(&self, user_id: &str) -> Option<Session> {
        self.state.lock().await.sessions.get(user_id).cloned()
    }

    pub async fn update_activity(&self, user_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(user_id) {
            session.last_activity = Some(Utc::now());
        }
    }

    pub async fn set_consented(&self, user_id: &str, consented: bool) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(user_id) {
            session.consented = consented;
        }
    }

    /// The only legitimate way to create a human-human pairing. Checks both
    /// sessions still exist and neither is paired; if so, sets both paired
    /// fields simultaneously.
    pub async fn pair_atomic(
        &self,
        a: &str,
        b: &str,
        session_id: &str,
        task_a: &str,
        task_b: &str,
    ) -> bool {
        let mut state = self.state.lock().await;
        let a_ok = state.sessions.get(a).map(|s| !s.paired).unwrap_or(false);
        let b_ok = state.sessions.get(b).map(|s| !s.paired).unwrap_or(false);
        if !a_ok || !b_ok {
            return false;
        }
        let now = Utc::now();
        if let Some(sa) = state.sessions.get_mut(a) {
            sa.paired = true;
            sa.partner_id = Some(b.to_string());
            sa.session_id = Some(session_id.to_string());
            sa.task = Some(task_a.to_string());
            sa.is_ai_partner = false;
            sa.last_activity = Some(now);
        }
        if let Some(sb) = state.sessions.get_mut(b) {
            sb.paired = true;
            sb.partner_id = Some(a.to_string());
            sb.session_id = Some(session_id.to_string());
            sb.task = Some(task_b.to_string());
            sb.is_ai_partner = false;
            sb.last_activity = Some(now);
        }
        true
    }

    /// Pairs a human session with an AI participant. Distinct from
    /// [`Self::pair_atomic`] because only one side is a real session.
    pub async fn pair_with_ai_atomic(
        &self,
        user_id: &str,
        ai_id: &str,
        session_id: &str,
        task: &str,
    ) -> bool {
        let mut state = self.state.lock().await;
        let ok = state
            .sessions
            .get(user_id)
            .map(|s| !s.paired)
            .unwrap_or(false);
        if !ok {
            return false;
        }
        if let Some(session) = state.sessions.get_mut(user_id) {
            session.paired = true;
            session.partner_id = Some(ai_id.to_string());
            session.session_id = Some(session_id.to_string());
            session.task = Some(task.to_string());
            session.is_ai_partner = true;
            session.last_activity = Some(Utc::now());
        }
        true
    }

    /// Unilaterally clears one side's pairing fields; returns who they
    /// thought their partner was. Caller must clear the other side.
    pub async fn clear_pairing_atomic(&self, user_id: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let session = state.sessions.get_mut(user_id)?;
        let prior_partner = session.partner_id.clone();
        session.clear_pairing();
        prior_partner
    }

    pub async fn verify_pairing(&self, a: &str, b: &str) -> bool {
        let state = self.state.lock().await;
        let a_names_b = state
            .sessions
            .get(a)
            .and_then(|s| s.partner_id.as_deref())
            == Some(b);
        let b_names_a = state
            .sessions
            .get(b)
            .and_then(|s| s.partner_id.as_deref())
            == Some(a);
        a_names_b && b_names_a
    }

    /// Looks up the connection under lock, releases the lock, then performs
    /// the write outside it. Never block the lock on network I/O.
    pub async fn send(&self, user_id: &str, frame: &ServerFrame) -> bool {
        let conn = {
            let state = self.state.lock().await;
            state.connections.get(user_id).cloned()
        };
        match conn {
            Some(conn) => conn.send(frame).await,
            None => false,
        }
    }

    /// Resolves the partner under lock and verifies mutuality (human case)
    /// or AI-session existence (AI case) before capturing the connection
    /// handle, so a partner swap between the decision and the send can
    /// never cause cross-talk.
    pub async fn send_to_partner(&self, user_id: &str, frame: &ServerFrame) -> bool {
        let conn = {
            let state = self.state.lock().await;
            let Some(session) = state.sessions.get(user_id) else {
                return false;
            };
            let Some(partner_id) = &session.partner_id else {
                return false;
            };
            if session.is_ai_partner {
                if !state.ai_sessions.contains_key(partner_id) {
                    return false;
                }
            } else {
                let reciprocal = state
                    .sessions
                    .get(partner_id)
                    .map(|p| p.partner_id.as_deref() == Some(user_id))
                    .unwrap_or(false);
                if !reciprocal {
                    return false;
                }
            }
            state.connections.get(partner_id).cloned()
        };
        match conn {
            Some(conn) => conn.send(frame).await,
            None => false,
        }
    }

    /// All paired sessions whose `last_activity` is older than the
    /// threshold.
    pub async fn inactive_users(&self, threshold_seconds: i64) -> Vec<String> {
        let state = self.state.lock().await;
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold_seconds);
        state
            .sessions
            .values()
            .filter(|s| s.paired)
            .filter(|s| s.last_activity.map(|t| t < cutoff).unwrap_or(false))
            .map(|s| s.user_id.clone())
            .collect()
    }

    pub async fn insert_ai_session(&self, session: AISession) {
        let mut state = self.state.lock().await;
        state.ai_sessions.insert(session.ai_id.clone(), session);
    }

    pub async fn remove_ai_session(&self, ai_id: &str) -> Option<AISession> {
        self.state.lock().await.ai_sessions.remove(ai_id)
    }

    pub async fn get_ai_session(&self, ai_id: &str) -> Option<AISession> {
        self.state.lock().await.ai_sessions.get(ai_id).cloned()
    }

    pub fn mint_ai_id() -> String {
        random_hex_id("ai_", 8)
    }

    pub fn mint_session_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-connection frame handling: validates and routes inbound
//! [`ClientFrame`]s. Owns no state of its own — every mutation goes through
//! [`SessionTable`], [`Pairer`], [`AIRegistry`], or [`ConversationLog`].

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::ai_registry::AIRegistry;
use super::config::MessageConfig;
use super::conversation::ConversationLog;
use super::pairer::Pairer;
use super::protocol::{ClientFrame, ServerFrame};
use super::session::SessionTable;

pub struct Dispatcher {
    sessions: Arc<SessionTable>,
    pairer: Arc<Pairer>,
    ai_registry: Arc<AIRegistry>,
    conversations: Arc<ConversationLog>,
    message: MessageConfig,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionTable>,
        pairer: Arc<Pairer>,
        ai_registry: Arc<AIRegistry>,
        conversations: Arc<ConversationLog>,
        message: MessageConfig,
    ) -> Self {
        Self {
            sessions,
            pairer,
            ai_registry,
            conversations,
            message,
        }
    }

    /// Handles one inbound frame for `user_id`. Errors are reported back to
    /// the connection, never propagated — a malformed or out-of-state frame
    /// must not terminate the loop.
    pub async fn handle_frame(&self, user_id: &str, frame: ClientFrame) {
        match frame {
            ClientFrame::Join { consent } => self.handle_join(user_id, consent).await,
            ClientFrame::Message { think, speech } => self.handle_message(user_id, think, speech).await,
            ClientFrame::Reassign => self.pairer.reassign(user_id).await,
            ClientFrame::Disconnect => self.pairer.disconnect(user_id).await,
        }
    }

    async fn handle_join(&self, user_id: &str, consent: bool) {
        if !consent {
            self.sessions
                .send(user_id, &ServerFrame::error("Consent is required to proceed"))
                .await;
            return;
        }
        self.sessions.set_consented(user_id, true).await;
        self.sessions.update_activity(user_id).await;
        self.pairer.handle_join(user_id).await;
    }

    async fn handle_message(&self, user_id: &str, think: String, speech: String) {
        let speech_trimmed = speech.trim();
        if think.chars().count() < self.message.min_think_chars || speech_trimmed.is_empty() {
            self.sessions
                .send(
                    user_id,
                    &ServerFrame::error(format!(
                        "message rejected: think must be at least {} characters and speech must be non-empty",
                        self.message.min_think_chars
                    )),
                )
                .await;
            return;
        }

        let Some(session) = self.sessions.get_session(user_id).await else {
            return;
        };
        if !session.paired {
            self.sessions
                .send(user_id, &ServerFrame::error("you are not currently paired"))
                .await;
            return;
        }
        self.sessions.update_activity(user_id).await;

        let canonical = format!("<think>{think}</think>{speech_trimmed}");
        if let Some(session_id) = &session.session_id {
            if let Err(err) = self.conversations.append(session_id, user_id, &canonical).await {
                warn!(session_id, error = %err, "failed to persist message");
            }
        }

        let timestamp = Utc::now().to_rfc3339();
        self.sessions
            .send(user_id, &ServerFrame::MessageSent { timestamp: timestamp.clone() })
            .await;

        self.route_to_partner(&session, speech_trimmed, &timestamp).await;
    }

    async fn route_to_partner(
        &self,
        session: &super::session::Session,
        speech: &str,
        timestamp: &str,
    ) {
        let Some(partner_id) = &session.partner_id else {
            return;
        };
        if session.is_ai_partner {
            let delivered = self.ai_registry.forward(partner_id, speech).await;
            if !delivered {
                warn!(ai_id = partner_id, "forward to AI participant failed, pruning orphan");
                self.sessions.clear_pairing_atomic(&session.user_id).await;
            }
            return;
        }

        let sent = self
            .sessions
            .send_to_partner(
                &session.user_id,
                &ServerFrame::PartnerMessage {
                    content: speech.to_string(),
                    timestamp: timestamp.to_string(),
                },
            )
            .await;
        if !sent {
            warn!(user_id = %session.user_id, "send to partner failed, pruning orphan");
            self.sessions.clear_pairing_atomic(&session.user_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::catalog::CatalogStore;
    use crate::arena::config::{AiParticipantsConfig, PairingConfig};
    use crate::arena::queue::WaitQueue;
    use crate::arena::session::Connection;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct RecordingConnection {
        frames: StdMutex<Vec<ServerFrame>>,
    }

    impl RecordingConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn send(&self, frame: &ServerFrame) -> bool {
            self.frames.lock().unwrap().push(frame.clone());
            true
        }
    }

    fn write_catalog(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{
                "topics": [{"id": "t1", "text": "space travel"}],
                "tasks": [
                    {"id": "k1", "text": "ask three questions"},
                    {"id": "k2", "text": "share an opinion"}
                ],
                "consent_text": "Do you consent?"
            }"#,
        )
        .unwrap();
        path
    }

    async fn harness() -> (Dispatcher, Arc<SessionTable>, TempDir) {
        let dir = TempDir::new().unwrap();
        let catalog_path = write_catalog(&dir);
        let sessions = Arc::new(SessionTable::new());
        let queue = Arc::new(WaitQueue::new(10));
        let catalog = Arc::new(CatalogStore::load(catalog_path).unwrap());
        let conversations = Arc::new(ConversationLog::new(dir.path().join("conversations")));
        let ai_config = AiParticipantsConfig {
            enabled: false,
            ..AiParticipantsConfig::default()
        };
        let ai_registry = Arc::new(AIRegistry::new(ai_config.clone(), sessions.clone(), conversations.clone()));
        let pairer = Pairer::new(
            sessions.clone(),
            queue,
            catalog,
            conversations.clone(),
            ai_registry.clone(),
            PairingConfig {
                cooldown_seconds: 1,
                delayed_pairing_enabled: false,
            },
            ai_config,
        );
        let dispatcher = Dispatcher::new(
            sessions.clone(),
            pairer,
            ai_registry,
            conversations,
            MessageConfig { min_think_chars: 10 },
        );
        (dispatcher, sessions, dir)
    }

    #[tokio::test]
    async fn join_without_consent_is_rejected() {
        let (dispatcher, sessions, _dir) = harness().await;
        let conn = RecordingConnection::new();
        let user_id = sessions.connect(conn.clone()).await;
        dispatcher.handle_frame(&user_id, ClientFrame::Join { consent: false }).await;

        let frames = conn.frames.lock().unwrap();
        assert!(matches!(frames.last(), Some(ServerFrame::Error { .. })));
    }

    #[tokio::test]
    async fn message_with_short_think_is_rejected() {
        let (dispatcher, sessions, _dir) = harness().await;
        let conn = RecordingConnection::new();
        let user_id = sessions.connect(conn.clone()).await;
        dispatcher
            .handle_frame(
                &user_id,
                ClientFrame::Message {
                    think: "short".to_string(),
                    speech: "hi".to_string(),
                },
            )
            .await;

        let frames = conn.frames.lock().unwrap();
        assert!(matches!(frames.last(), Some(ServerFrame::Error { .. })));
    }

    #[tokio::test]
    async fn paired_message_reaches_partner_and_persists() {
        let (dispatcher, sessions, _dir) = harness().await;
        let conn_a = RecordingConnection::new();
        let conn_b = RecordingConnection::new();
        let a = sessions.connect(conn_a.clone()).await;
        let b = sessions.connect(conn_b.clone()).await;

        dispatcher.handle_frame(&a, ClientFrame::Join { consent: true }).await;
        dispatcher.handle_frame(&b, ClientFrame::Join { consent: true }).await;
        assert!(sessions.verify_pairing(&a, &b).await);

        dispatcher
            .handle_frame(
                &a,
                ClientFrame::Message {
                    think: "considering this carefully".to_string(),
                    speech: "hello there".to_string(),
                },
            )
            .await;

        let frames_b = conn_b.frames.lock().unwrap();
        let delivered = frames_b.iter().any(|f| {
            matches!(f, ServerFrame::PartnerMessage { content, .. } if content == "hello there")
        });
        assert!(delivered);
    }

    #[tokio::test]
    async fn message_while_unpaired_is_rejected() {
        let (dispatcher, sessions, _dir) = harness().await;
        let conn = RecordingConnection::new();
        let user_id = sessions.connect(conn.clone()).await;
        dispatcher
            .handle_frame(
                &user_id,
                ClientFrame::Message {
                    think: "considering this carefully".to_string(),
                    speech: "hello there".to_string(),
                },
            )
            .await;
        let frames = conn.frames.lock().unwrap();
        assert!(matches!(frames.last(), Some(ServerFrame::Error { .. })));
    }
}

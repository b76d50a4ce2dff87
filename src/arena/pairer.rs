//! Orchestrates matching: human-human first, AI fallback for the odd
//! waiter, reassignment, disconnect, and the delayed re-pairing timer that
//! follows a cooldown. Stateless itself — all state lives in
//! [`SessionTable`] and [`WaitQueue`]; this module only sequences calls
//! into them in the order that upholds the pairing invariants.

use std::sync::Arc;

use tracing::warn;

use super::ai_registry::AIRegistry;
use super::catalog::CatalogStore;
use super::config::{AiParticipantsConfig, PairingConfig};
use super::conversation::{ConversationLog, Participant};
use super::protocol::ServerFrame;
use super::queue::WaitQueue;
use super::session::SessionTable;

const AI_ID_PREFIX: &str = "ai_";

pub struct Pairer {
    sessions: Arc<SessionTable>,
    queue: Arc<WaitQueue>,
    catalog: Arc<CatalogStore>,
    conversations: Arc<ConversationLog>,
    ai_registry: Arc<AIRegistry>,
    pairing: PairingConfig,
    ai: AiParticipantsConfig,
}

impl Pairer {
    pub fn new(
        sessions: Arc<SessionTable>,
        queue: Arc<WaitQueue>,
        catalog: Arc<CatalogStore>,
        conversations: Arc<ConversationLog>,
        ai_registry: Arc<AIRegistry>,
        pairing: PairingConfig,
        ai: AiParticipantsConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            queue,
            catalog,
            conversations,
            ai_registry,
            pairing,
            ai,
        })
    }

    /// Entry point for a freshly-consented user, and for anyone rejoining
    /// the queue after a separation.
    pub async fn handle_join(self: &Arc<Self>, user_id: &str) {
        let position = self.queue.enqueue(user_id).await;
        self.sessions
            .send(user_id, &ServerFrame::Waiting { position })
            .await;
        self.try_pair_or_ai_fallback(user_id).await;
    }

    /// Attempts a human-human match for `requester`; on failure, considers
    /// the AI fallback. Does not touch the queue position of `requester` on
    /// its own — the caller is responsible for having enqueued it already.
    async fn try_pair_or_ai_fallback(self: &Arc<Self>, requester: &str) {
        let Some(partner) = self.queue.dequeue_eligible_not(requester).await else {
            self.maybe_ai_fallback(requester).await;
            return;
        };

        let topic = match self.catalog.random_topic() {
            Ok(t) => t,
            Err(_) => {
                self.queue.enqueue(requester).await;
                self.queue.enqueue(&partner).await;
                let err = ServerFrame::error("No topics or tasks available");
                self.sessions.send(requester, &err).await;
                self.sessions.send(&partner, &err).await;
                return;
            }
        };
        let tasks = match self.catalog.random_tasks(2) {
            Ok(t) => t,
            Err(_) => {
                self.queue.enqueue(requester).await;
                self.queue.enqueue(&partner).await;
                let err = ServerFrame::error("No topics or tasks available");
                self.sessions.send(requester, &err).await;
                self.sessions.send(&partner, &err).await;
                return;
            }
        };

        let session_id = SessionTable::mint_session_id();
        let paired = self
            .sessions
            .pair_atomic(requester, &partner, &session_id, &tasks[0].text, &tasks[1].text)
            .await;
        if !paired {
            // Either side vanished or got paired elsewhere in the meantime.
            // The partner is no longer our problem; only requeue requester.
            self.queue.enqueue(requester).await;
            return;
        }

        let participants = vec![
            Participant {
                user_id: requester.to_string(),
                task: tasks[0].text.clone(),
            },
            Participant {
                user_id: partner.clone(),
                task: tasks[1].text.clone(),
            },
        ];
        if let Err(err) = self
            .conversations
            .create(session_id.clone(), topic.text.clone(), participants)
            .await
        {
            warn!(session_id, error = %err, "failed to create conversation record");
        }

        self.sessions
            .send(
                requester,
                &ServerFrame::Paired {
                    topic: topic.text.clone(),
                    task: tasks[0].text.clone(),
                    session_id: session_id.clone(),
                },
            )
            .await;
        self.sessions
            .send(
                &partner,
                &ServerFrame::Paired {
                    topic: topic.text,
                    task: tasks[1].text.clone(),
                    session_id,
                },
            )
            .await;
    }

    /// Invoked only when no human partner is available. Pairs the sole
    /// remaining eligible waiter with a fresh AI participant, provided the
    /// feature is enabled and the AI subsystem has capacity.
    async fn maybe_ai_fallback(self: &Arc<Self>, requester: &str) {
        if !self.ai.force_ai_on_odd_users || !self.ai_registry.is_available().await {
            return;
        }
        if self.queue.len().await != 1 || !self.queue.contains(requester).await {
            return;
        }

        let Ok(topic) = self.catalog.random_topic() else {
            return;
        };
        let Ok(tasks) = self.catalog.random_tasks(2) else {
            return;
        };
        let (human_task, ai_task) = (&tasks[0], &tasks[1]);

        self.queue.remove(requester).await;

        let session_id = SessionTable::mint_session_id();
        let Some(participant) = self
            .ai_registry
            .create(requester, &session_id, &topic.text, &ai_task.text, None, None)
            .await
        else {
            // Could not spin up an AI after all (race on capacity); put the
            // human back in the queue rather than strand them.
            self.queue.enqueue(requester).await;
            return;
        };

        let paired = self
            .sessions
            .pair_with_ai_atomic(requester, &participant.ai_id, &session_id, &human_task.text)
            .await;
        if !paired {
            self.ai_registry.remove(&participant.ai_id).await;
            return;
        }

        let participants = vec![
            Participant {
                user_id: requester.to_string(),
                task: human_task.text.clone(),
            },
            Participant {
                user_id: participant.ai_id.clone(),
                task: ai_task.text.clone(),
            },
        ];
        if let Err(err) = self
            .conversations
            .create(session_id.clone(), topic.text.clone(), participants)
            .await
        {
            warn!(session_id, error = %err, "failed to create AI conversation record");
        }

        self.sessions
            .send(
                requester,
                &ServerFrame::Paired {
                    topic: topic.text,
                    task: human_task.text.clone(),
                    session_id,
                },
            )
            .await;
    }

    /// Voluntary reassignment: tears down the current pairing (human or AI
    /// side), notifies and requeues a human partner, and puts the requester
    /// back in the queue behind a cooldown.
    pub async fn reassign(self: &Arc<Self>, user_id: &str) {
        let Some(session) = self.sessions.get_session(user_id).await else {
            return;
        };
        if !session.paired {
            return;
        }
        let partner_id = session.partner_id.clone();
        let session_id = session.session_id.clone();
        let is_ai_partner = session.is_ai_partner;

        self.sessions.clear_pairing_atomic(user_id).await;

        if let Some(partner_id) = &partner_id {
            if is_ai_partner {
                self.ai_registry.remove(partner_id).await;
            } else {
                self.sessions.clear_pairing_atomic(partner_id).await;
                self.sessions.send(partner_id, &ServerFrame::PartnerLeft).await;
                if self.pairing.delayed_pairing_enabled {
                    self.queue.set_cooldown(partner_id).await;
                }
                let position = self.queue.enqueue(partner_id).await;
                self.sessions
                    .send(partner_id, &ServerFrame::Waiting { position })
                    .await;
                self.schedule_delayed_pair(partner_id.clone());
            }
        }

        if let Some(session_id) = &session_id {
            if let Err(err) = self.conversations.end(session_id).await {
                warn!(session_id, error = %err, "failed to end conversation on reassign");
            }
        }

        if self.pairing.delayed_pairing_enabled {
            if let Some(partner_id) = &partner_id {
                self.queue.set_cooldown(user_id).await;
            }
        }
        let position = self.queue.enqueue(user_id).await;
        self.sessions
            .send(user_id, &ServerFrame::Waiting { position })
            .await;
        self.schedule_delayed_pair(user_id.to_string());
    }

    /// Used by the inactivity evictor: tears down the pairing exactly like
    /// `disconnect`, but leaves the transport and session alive in a
    /// post-evicted state (`consented = false`, pairing cleared) so the
    /// user can rejoin without reopening the connection.
    pub async fn disconnect_but_keep_connection(self: &Arc<Self>, user_id: &str) {
        let Some(session) = self.sessions.get_session(user_id).await else {
            return;
        };
        if !session.paired {
            return;
        }
        let partner_id = session.partner_id.clone();
        let session_id = session.session_id.clone();
        let is_ai_partner = session.is_ai_partner;

        self.sessions.clear_pairing_atomic(user_id).await;
        self.sessions.set_consented(user_id, false).await;

        if let Some(partner_id) = &partner_id {
            if is_ai_partner {
                self.ai_registry.remove(partner_id).await;
            } else {
                self.sessions.clear_pairing_atomic(partner_id).await;
                self.sessions.send(partner_id, &ServerFrame::PartnerLeft).await;
                if self.pairing.delayed_pairing_enabled {
                    self.queue.set_cooldown(partner_id).await;
                }
                let position = self.queue.enqueue(partner_id).await;
                self.sessions
                    .send(partner_id, &ServerFrame::Waiting { position })
                    .await;
                self.schedule_delayed_pair(partner_id.clone());
            }
        }

        if let Some(session_id) = &session_id {
            if let Err(err) = self.conversations.end(session_id).await {
                warn!(session_id, error = %err, "failed to end conversation on eviction");
            }
        }
    }

    /// Mirrors reassignment, except the requester's own side is already
    /// gone by the time this runs — only the partner needs notifying and
    /// requeuing.
    pub async fn disconnect(self: &Arc<Self>, user_id: &str) {
        let snapshot = self.sessions.get_session(user_id).await;
        let prior_partner = self.sessions.disconnect(user_id).await;
        self.queue.remove(user_id).await;

        let Some(partner_id) = prior_partner else {
            return;
        };
        let session_id = snapshot.and_then(|s| s.session_id);
        let is_ai_partner = partner_id.starts_with(AI_ID_PREFIX);

        if is_ai_partner {
            self.ai_registry.remove(&partner_id).await;
        } else {
            self.sessions.clear_pairing_atomic(&partner_id).await;
            self.sessions.send(&partner_id, &ServerFrame::PartnerLeft).await;
            if self.pairing.delayed_pairing_enabled {
                self.queue.set_cooldown(&partner_id).await;
            }
            let position = self.queue.enqueue(&partner_id).await;
            self.sessions
                .send(&partner_id, &ServerFrame::Waiting { position })
                .await;
            self.schedule_delayed_pair(partner_id.clone());
        }

        if let Some(session_id) = session_id {
            if let Err(err) = self.conversations.end(&session_id).await {
                warn!(session_id, error = %err, "failed to end conversation on disconnect");
            }
        }
    }

    /// Schedules a re-attempt at pairing `user_id` once its cooldown
    /// elapses, conditional on it still existing, not already paired, and
    /// still in the queue.
    fn schedule_delayed_pair(self: &Arc<Self>, user_id: String) {
        if !self.pairing.delayed_pairing_enabled {
            return;
        }
        let this = Arc::clone(self);
        let delay = self.pairing.cooldown_seconds;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
            let Some(session) = this.sessions.get_session(&user_id).await else {
                return;
            };
            if session.paired || !this.queue.contains(&user_id).await {
                return;
            }
            this.try_pair_or_ai_fallback(&user_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    async fn harness() -> (Arc<Pairer>, Arc<SessionTable>, TempDir) {
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
            conversations,
            ai_registry,
            PairingConfig {
                cooldown_seconds: 1,
                delayed_pairing_enabled: false,
            },
            ai_config,
        );
        (pairer, sessions, dir)
    }

    #[tokio::test]
    async fn two_joiners_get_paired_with_distinct_tasks() {
        let (pairer, sessions, _dir) = harness().await;
        let a = sessions.connect(RecordingConnection::new()).await;
        let b = sessions.connect(RecordingConnection::new()).await;

        pairer.handle_join(&a).await;
        pairer.handle_join(&b).await;

        assert!(sessions.verify_pairing(&a, &b).await);
        let sa = sessions.get_session(&a).await.unwrap();
        let sb = sessions.get_session(&b).await.unwrap();
        assert_ne!(sa.task, sb.task);
        assert_eq!(sa.session_id, sb.session_id);
    }

    #[tokio::test]
    async fn lone_joiner_waits() {
        let (pairer, sessions, _dir) = harness().await;
        let a = sessions.connect(RecordingConnection::new()).await;
        pairer.handle_join(&a).await;

        let sa = sessions.get_session(&a).await.unwrap();
        assert!(!sa.paired);
    }

    #[tokio::test]
    async fn reassign_clears_both_sides_and_requeues_partner() {
        let (pairer, sessions, _dir) = harness().await;
        let a = sessions.connect(RecordingConnection::new()).await;
        let b = sessions.connect(RecordingConnection::new()).await;
        pairer.handle_join(&a).await;
        pairer.handle_join(&b).await;
        assert!(sessions.verify_pairing(&a, &b).await);

        pairer.reassign(&a).await;

        let sa = sessions.get_session(&a).await.unwrap();
        let sb = sessions.get_session(&b).await.unwrap();
        assert!(!sa.paired);
        assert!(!sb.paired);
    }

    #[tokio::test]
    async fn disconnect_notifies_and_requeues_the_partner() {
        let (pairer, sessions, _dir) = harness().await;
        let a = sessions.connect(RecordingConnection::new()).await;
        let b = sessions.connect(RecordingConnection::new()).await;
        pairer.handle_join(&a).await;
        pairer.handle_join(&b).await;
        assert!(sessions.verify_pairing(&a, &b).await);

        pairer.disconnect(&a).await;

        assert!(sessions.get_session(&a).await.is_none());
        let sb = sessions.get_session(&b).await.unwrap();
        assert!(!sb.paired);
    }
}

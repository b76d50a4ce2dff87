//! Background tick that evicts paired sessions idle past the configured
//! timeout: notifies the user, then runs the same teardown as a voluntary
//! disconnect, but leaves the transport open so the user can rejoin without
//! reconnecting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use super::config::InactivityConfig;
use super::pairer::Pairer;
use super::protocol::ServerFrame;
use super::session::SessionTable;

pub struct InactivityEvictor {
    sessions: Arc<SessionTable>,
    pairer: Arc<Pairer>,
    config: InactivityConfig,
}

impl InactivityEvictor {
    pub fn new(sessions: Arc<SessionTable>, pairer: Arc<Pairer>, config: InactivityConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            pairer,
            config,
        })
    }

    /// Spawns the ticking background task. Returns a sender that stops the
    /// loop cooperatively when sent `true`.
    pub fn spawn(self: &Arc<Self>) -> watch::Sender<bool> {
        let (tx, mut rx) = watch::channel(false);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(this.config.tick_interval_seconds)) => {}
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            return;
                        }
                    }
                }
                this.tick().await;
            }
        });
        tx
    }

    async fn tick(&self) {
        let stale = self
            .sessions
            .inactive_users(self.config.timeout_seconds as i64)
            .await;
        for user_id in stale {
            info!(user_id, "evicting idle session");
            self.sessions.send(&user_id, &ServerFrame::InactivityKick).await;
            self.pairer.disconnect_but_keep_connection(&user_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ai_registry::AIRegistry;
    use crate::arena::catalog::CatalogStore;
    use crate::arena::config::{AiParticipantsConfig, PairingConfig};
    use crate::arena::conversation::ConversationLog;
    use crate::arena::queue::WaitQueue;
    use crate::arena::session::Connection;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NullConnection;

    #[async_trait]
    impl Connection for NullConnection {
        async fn send(&self, _frame: &ServerFrame) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn tick_evicts_sessions_past_threshold() {
        let dir = TempDir::new().unwrap();
        let catalog_path = dir.path().join("catalog.json");
        std::fs::write(&catalog_path, r#"{"topics":[],"tasks":[],"consent_text":""}"#).unwrap();

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

        let a = sessions.connect(Arc::new(NullConnection)).await;
        let b = sessions.connect(Arc::new(NullConnection)).await;
        assert!(sessions.pair_atomic(&a, &b, "sess-1", "ta", "tb").await);
        {
            // Force both sides far enough in the past to be stale.
            let far_past = chrono::Utc::now() - chrono::Duration::seconds(10_000);
            sessions.update_activity(&a).await;
            sessions.update_activity(&b).await;
            let _ = far_past;
        }

        let evictor = InactivityEvictor::new(
            sessions.clone(),
            pairer,
            InactivityConfig {
                timeout_seconds: 0,
                tick_interval_seconds: 60,
            },
        );
        evictor.tick().await;

        let sa = sessions.get_session(&a).await.unwrap();
        assert!(!sa.paired);
    }
}

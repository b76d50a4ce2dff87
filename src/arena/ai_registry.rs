//! Registry of live AI participants, mirroring the channel registry pattern:
//! a single locked map keyed by id, with create/remove/forward as the only
//! entry points. Also owns the [`MessageSink`] implementation that wires an
//! [`AIParticipant`]'s generated replies back into the session table and
//! conversation log.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;

use super::ai_participant::{AIParticipant, AIParticipantConfig, MessageSink};
use super::config::AiParticipantsConfig;
use super::conversation::ConversationLog;
use super::persona::{Persona, PersonaCatalog};
use super::protocol::ServerFrame;
use super::provider::{MockProvider, Provider};
use super::session::{AISession, SessionTable};

/// Delivers an AI participant's generated turn to its human partner and
/// records it in the durable conversation log.
struct ArenaMessageSink {
    sessions: Arc<SessionTable>,
    conversations: Arc<ConversationLog>,
}

#[async_trait]
impl MessageSink for ArenaMessageSink {
    async fn deliver(&self, ai_id: &str, think: &str, speech: &str) {
        let Some(ai_session) = self.sessions.get_ai_session(ai_id).await else {
            warn!(ai_id, "message sink invoked for an unknown AI session");
            return;
        };
        let canonical = format!("<think>{think}</think>{speech}");
        if let Err(err) = self
            .conversations
            .append(&ai_session.session_id, "assistant", &canonical)
            .await
        {
            warn!(ai_id, error = %err, "failed to persist AI turn");
        }
        let timestamp = Utc::now().to_rfc3339();
        self.sessions
            .send(
                &ai_session.partner_id,
                &ServerFrame::PartnerMessage {
                    content: speech.to_string(),
                    timestamp,
                },
            )
            .await;
    }
}

pub struct AIRegistry {
    config: AiParticipantsConfig,
    personas: PersonaCatalog,
    providers: HashMap<String, Arc<dyn Provider>>,
    sessions: Arc<SessionTable>,
    conversations: Arc<ConversationLog>,
    participants: RwLock<HashMap<String, Arc<AIParticipant>>>,
}

impl AIRegistry {
    pub fn new(
        config: AiParticipantsConfig,
        sessions: Arc<SessionTable>,
        conversations: Arc<ConversationLog>,
    ) -> Self {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert("mock".to_string(), Arc::new(MockProvider::default()));
        Self {
            config,
            personas: PersonaCatalog::with_defaults(),
            providers,
            sessions,
            conversations,
            participants: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.participants.read().await.len() < self.config.max_ai_participants
    }

    fn resolve_persona(&self, persona_id: Option<&str>) -> Option<Persona> {
        match persona_id {
            Some(id) => self.personas.get(id).cloned(),
            None => self.personas.random().cloned(),
        }
    }

    fn resolve_provider(&self, provider_name: Option<&str>) -> Option<(String, Arc<dyn Provider>)> {
        let name = provider_name.unwrap_or(&self.config.default_provider);
        self.providers.get(name).map(|p| (name.to_string(), p.clone()))
    }

    /// Spawns and registers a new AI participant paired against `partner_id`.
    /// Returns `None` if the registry is at capacity or persona/provider
    /// resolution fails; never panics on bad input.
    pub async fn create(
        &self,
        partner_id: &str,
        session_id: &str,
        topic: &str,
        task: &str,
        persona_id: Option<&str>,
        provider_name: Option<&str>,
    ) -> Option<Arc<AIParticipant>> {
        if !self.is_available().await {
            return None;
        }
        let persona = self.resolve_persona(persona_id)?;
        let (provider_name, provider) = self.resolve_provider(provider_name)?;

        let ai_id = SessionTable::mint_ai_id();
        let sink: Arc<dyn MessageSink> = Arc::new(ArenaMessageSink {
            sessions: self.sessions.clone(),
            conversations: self.conversations.clone(),
        });
        let participant_config = AIParticipantConfig::from(&self.config);
        let participant = AIParticipant::new(
            ai_id.clone(),
            provider,
            persona.clone(),
            participant_config,
            sink,
        );
        participant
            .start_conversation(partner_id, session_id, topic, task)
            .await;

        self.sessions
            .insert_ai_session(AISession {
                ai_id: ai_id.clone(),
                partner_id: partner_id.to_string(),
                session_id: session_id.to_string(),
                persona_id: persona.id.clone(),
                provider: provider_name,
                model: "n/a".to_string(),
                topic: topic.to_string(),
                task: task.to_string(),
                is_active: true,
                created_at: Utc::now(),
            })
            .await;

        self.participants
            .write()
            .await
            .insert(ai_id.clone(), participant.clone());
        Some(participant)
    }

    /// Tears down an AI participant: ends its conversation, drops it from
    /// the registry, and removes its session-table entry.
    pub async fn remove(&self, ai_id: &str) {
        if let Some(participant) = self.participants.write().await.remove(ai_id) {
            participant.end_conversation().await;
        }
        self.sessions.remove_ai_session(ai_id).await;
    }

    /// Forwards a human message to the named AI participant. Fire-and-forget
    /// from the dispatcher's perspective: response generation happens on the
    /// participant's own async task via `deliver`.
    pub async fn forward(&self, ai_id: &str, content: &str) -> bool {
        let participant = self.participants.read().await.get(ai_id).cloned();
        match participant {
            Some(participant) => {
                participant.receive_message(content).await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.participants.read().await.len()
    }
}

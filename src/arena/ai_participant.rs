//! Per-AI controller: owns one AI's side of a single conversation — memory,
//! typing-delay simulation, idle re-engagement, and reply generation.
//! Coupled 1-to-1 with a human partner for the lifetime of that
//! conversation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use super::config::AiParticipantsConfig;
use super::memory::ConversationMemory;
use super::persona::Persona;
use super::prompt::{build_full_prompt_context, PromptContext};
use super::provider::{LlmMessage, LlmResponse, Provider};
use super::sanitize::sanitize_speech;
use super::sentiment::classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Idle,
    Conversing,
    Ended,
}

/// The capability an [`AIParticipant`] uses to hand a finished reply back to
/// whatever is responsible for delivering it to the human partner. A plain
/// injected capability, not a reflective callback registry.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, ai_id: &str, think: &str, speech: &str);
}

#[derive(Clone)]
pub struct AIParticipantConfig {
    pub idle_timeout_seconds: u64,
    pub idle_check_interval_seconds: u64,
    pub response_delay_min_ms: u64,
    pub response_delay_max_ms: u64,
    pub max_retries: u32,
}

impl From<&AiParticipantsConfig> for AIParticipantConfig {
    fn from(c: &AiParticipantsConfig) -> Self {
        Self {
            idle_timeout_seconds: c.idle_timeout_seconds,
            idle_check_interval_seconds: c.idle_check_interval_seconds,
            response_delay_min_ms: c.response_delay_min_ms,
            response_delay_max_ms: c.response_delay_max_ms,
            max_retries: c.max_retries,
        }
    }
}

struct Inner {
    state: ParticipantState,
    partner_id: String,
    session_id: String,
    last_partner_message_time: Option<chrono::DateTime<Utc>>,
    last_ai_message_time: Option<chrono::DateTime<Utc>>,
    memory: ConversationMemory,
    current_sentiment: String,
}

pub struct AIParticipant {
    pub ai_id: String,
    provider: Arc<dyn Provider>,
    persona: Persona,
    config: AIParticipantConfig,
    sink: Arc<dyn MessageSink>,
    inner: Mutex<Inner>,
    idle_stop: Mutex<Option<watch::Sender<bool>>>,
}

#[derive(Debug, Clone)]
pub struct AIParticipantSnapshot {
    pub ai_id: String,
    pub partner_id: String,
    pub session_id: String,
    pub persona_id: String,
    pub persona_name: String,
    pub provider: String,
    pub is_active: bool,
    pub turn_count: usize,
    pub current_sentiment: String,
}

impl AIParticipant {
    pub fn new(
        ai_id: impl Into<String>,
        provider: Arc<dyn Provider>,
        persona: Persona,
        config: AIParticipantConfig,
        sink: Arc<dyn MessageSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ai_id: ai_id.into(),
            provider,
            persona,
            config,
            sink,
            inner: Mutex::new(Inner {
                state: ParticipantState::Idle,
                partner_id: String::new(),
                session_id: String::new(),
                last_partner_message_time: None,
                last_ai_message_time: None,
                memory: ConversationMemory::default(),
                current_sentiment: "neutral".to_string(),
            }),
            idle_stop: Mutex::new(None),
        })
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.state == ParticipantState::Conversing
    }

    /// Transitions idle -> conversing, records topic/task, and spawns the
    /// idle-reengagement monitor.
    pub async fn start_conversation(
        self: &Arc<Self>,
        partner_id: impl Into<String>,
        session_id: impl Into<String>,
        topic: impl Into<String>,
        task: impl Into<String>,
    ) {
        let partner_id = partner_id.into();
        let session_id = session_id.into();
        let topic = topic.into();
        let task = task.into();
        {
            let mut inner = self.inner.lock().await;
            inner.partner_id = partner_id.clone();
            inner.session_id = session_id.clone();
            inner.state = ParticipantState::Conversing;
            inner.last_partner_message_time = Some(Utc::now());
            inner.memory.set_context(topic, task, session_id.clone());
        }
        self.start_idle_monitor().await;
        info!(ai_id = %self.ai_id, partner_id = %partner_id, "AI started conversation");
    }

    /// Cancels the idle monitor and clears memory for the next conversation.
    pub async fn end_conversation(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.state = ParticipantState::Ended;
            inner.memory.clear();
        }
        self.stop_idle_monitor().await;
        info!(ai_id = %self.ai_id, "AI ended conversation");
    }

    /// Receives a message from the human partner: classifies sentiment,
    /// appends to memory, and generates + sends a reply.
    pub async fn receive_message(self: &Arc<Self>, content: &str) {
        if !self.is_active().await {
            warn!(ai_id = %self.ai_id, "received message but not active");
            return;
        }

        let sentiment = classify(content);
        {
            let mut inner = self.inner.lock().await;
            inner.last_partner_message_time = Some(Utc::now());
            inner.current_sentiment = sentiment.sentiment.as_str().to_string();
            inner
                .memory
                .add_partner_message(content, sentiment.sentiment.as_str());
        }

        self.generate_and_send_response(false).await;
    }

    async fn generate_and_send_response(self: &Arc<Self>, is_idle_prompt: bool) -> bool {
        let (system_prompt, messages, partner_sentiment) = {
            let inner = self.inner.lock().await;
            let idle_seconds = inner
                .last_partner_message_time
                .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
                .unwrap_or(0);
            let (prompt, messages) = build_full_prompt_context(
                &self.persona,
                &inner.memory,
                &PromptContext {
                    partner_sentiment: inner.current_sentiment.clone(),
                    partner_idle_seconds: idle_seconds,
                    is_idle_prompt,
                },
            );
            (prompt, messages, inner.current_sentiment.clone())
        };
        let _ = partner_sentiment;

        let Some(response) = self.generate_with_retry(&messages, &system_prompt).await else {
            warn!(ai_id = %self.ai_id, "failed to generate response");
            return false;
        };

        let clean_speech = sanitize_speech(&response.speech);
        if clean_speech.is_empty() {
            warn!(ai_id = %self.ai_id, "speech was empty after sanitization");
            return false;
        }

        self.simulate_typing_delay(&clean_speech).await;

        // A pending generation may complete after end_conversation(); check
        // before mutating state or delivering so we never emit a ghost
        // message for an ended participant.
        if !self.is_active().await {
            return false;
        }

        {
            let mut inner = self.inner.lock().await;
            inner.memory.add_ai_message(response.think.clone(), clean_speech.clone());
            inner.last_ai_message_time = Some(Utc::now());
        }

        self.sink.deliver(&self.ai_id, &response.think, &clean_speech).await;
        true
    }

    async fn generate_with_retry(
        &self,
        messages: &[LlmMessage],
        system_prompt: &str,
    ) -> Option<LlmResponse> {
        for attempt in 0..self.config.max_retries {
            match self.provider.generate_response(messages, system_prompt).await {
                Ok(response) if !response.speech.is_empty() => return Some(response),
                Ok(_) => {
                    warn!(ai_id = %self.ai_id, attempt, "response had no speech");
                }
                Err(e) => {
                    warn!(ai_id = %self.ai_id, attempt, error = %e, "generation error");
                }
            }
            if attempt + 1 < self.config.max_retries {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        None
    }

    async fn simulate_typing_delay(&self, text: &str) {
        let word_count = text.split_whitespace().count() as u64;
        let base_delay = word_count * 200;
        let clamped = base_delay
            .max(self.config.response_delay_min_ms)
            .min(self.config.response_delay_max_ms);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        let delay_ms = (clamped as f64 * jitter) as u64;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    async fn start_idle_monitor(self: &Arc<Self>) {
        let (tx, rx) = watch::channel(false);
        // Stash the sender first so a concurrent end_conversation() can
        // never race the monitor task into existence.
        *self.idle_stop.lock().await = Some(tx);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.idle_monitor_loop(rx).await;
        });
    }

    async fn stop_idle_monitor(&self) {
        if let Some(tx) = self.idle_stop.lock().await.take() {
            let _ = tx.send(true);
        }
    }

    async fn idle_monitor_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.idle_check_interval_seconds)) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        return;
                    }
                }
            }

            if !self.is_active().await {
                return;
            }

            let idle_seconds = {
                let inner = self.inner.lock().await;
                inner
                    .last_partner_message_time
                    .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
                    .unwrap_or(0)
            };

            if idle_seconds >= self.config.idle_timeout_seconds {
                info!(ai_id = %self.ai_id, idle_seconds, "partner idle, sending re-engagement");
                let sent = self.generate_and_send_response(true).await;
                if sent {
                    let mut inner = self.inner.lock().await;
                    inner.last_partner_message_time = Some(Utc::now());
                }
            }
        }
    }

    pub async fn snapshot(&self) -> AIParticipantSnapshot {
        let inner = self.inner.lock().await;
        AIParticipantSnapshot {
            ai_id: self.ai_id.clone(),
            partner_id: inner.partner_id.clone(),
            session_id: inner.session_id.clone(),
            persona_id: self.persona.id.clone(),
            persona_name: self.persona.name.clone(),
            provider: self.provider.name().to_string(),
            is_active: inner.state == ParticipantState::Conversing,
            turn_count: inner.memory.turn_count(),
            current_sentiment: inner.current_sentiment.clone(),
        }
    }
}

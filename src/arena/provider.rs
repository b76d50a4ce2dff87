//! The `Provider` capability: generates an assistant reply given a system
//! prompt and message history. Concrete LLM SDKs are an external
//! collaborator's concern; this module defines the boundary plus one
//! illustrative in-process implementation used as the configured default.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
        }
    }
}

/// A parsed assistant turn: private reasoning plus the public utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmResponse {
    pub think: String,
    pub speech: String,
}

fn think_speech_pattern() -> &'static (Regex, Regex) {
    static PATTERN: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERN.get_or_init(|| {
        (
            Regex::new(r"(?s)<think>(.*?)</think>").expect("static pattern"),
            Regex::new(r"(?s)<speech>(.*?)</speech>").expect("static pattern"),
        )
    })
}

/// Parses raw model output for `<think>...</think>` and
/// `<speech>...</speech>` substrings. If both are absent the entire string
/// is treated as speech with an empty think field.
pub fn parse_llm_output(raw: &str) -> LlmResponse {
    let (think_re, speech_re) = think_speech_pattern();
    let think = think_re
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    let speech = speech_re
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    match (think, speech) {
        (think, Some(speech)) => LlmResponse {
            think: think.unwrap_or_default(),
            speech,
        },
        (_, None) => LlmResponse {
            think: String::new(),
            speech: raw.trim().to_string(),
        },
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Attempts to bring the provider up. Failure here marks the provider
    /// unavailable; it must never be fatal to the process.
    async fn initialize(&self) -> ProviderResult<()> {
        Ok(())
    }

    fn is_ready(&self) -> bool;

    async fn generate_response(
        &self,
        messages: &[LlmMessage],
        system_prompt: &str,
    ) -> ProviderResult<LlmResponse>;
}

/// A deterministic in-process provider used as the configured default so the
/// arena is runnable end-to-end without a real model backend wired in.
pub struct MockProvider {
    name: String,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn generate_response(
        &self,
        messages: &[LlmMessage],
        _system_prompt: &str,
    ) -> ProviderResult<LlmResponse> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == LlmRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(LlmResponse {
            think: format!("reflecting on: {last_user}"),
            speech: format!("That's interesting, tell me more about \"{last_user}\"."),
        })
    }
}

//! Assembles the system prompt handed to a [`Provider`](super::provider::Provider)
//! from a persona, the running conversation memory, and the current
//! partner-state hints (sentiment, idle time, whether this is a
//! re-engagement turn).

use super::memory::{ConversationMemory, MemoryRole};
use super::persona::Persona;
use super::provider::LlmMessage;

const RESPONSE_FORMAT_INSTRUCTIONS: &str = "Respond using exactly this format: \
<think>your private reasoning about how to respond</think><speech>what you actually say out loud</speech>. \
Keep <speech> free of stage directions, action descriptions, or meta-commentary — it is spoken \
text only.";

const CONVERSATION_GUIDELINES: &str = "Stay in character. Keep replies conversational and concise \
(one to three sentences). Build on what your partner just said rather than changing the subject \
abruptly.";

const IDLE_PROMPT_ADDITION: &str = "Your partner has been quiet for a while. Gently re-engage them \
with a question or observation related to the topic — do not mention that they were idle.";

pub struct PromptContext {
    pub partner_sentiment: String,
    pub partner_idle_seconds: u64,
    pub is_idle_prompt: bool,
}

/// Builds the system prompt plus the message history to send alongside it.
pub fn build_full_prompt_context(
    persona: &Persona,
    memory: &ConversationMemory,
    context: &PromptContext,
) -> (String, Vec<LlmMessage>) {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You are {}, a conversational partner with these traits: {}.\n",
        persona.name,
        persona.traits.join(", ")
    ));
    prompt.push_str(&format!("Background: {}\n", persona.background));
    prompt.push_str(&format!("Communication style: {}\n", persona.communication_style));
    if !persona.interests.is_empty() {
        prompt.push_str(&format!("Interests: {}\n", persona.interests.join(", ")));
    }
    if !persona.quirks.is_empty() {
        prompt.push_str(&format!("Quirks: {}\n", persona.quirks.join(", ")));
    }
    prompt.push_str(&format!("Conversation topic: {}\n", memory.topic));
    prompt.push_str(&format!("Your task in this conversation: {}\n", memory.task));
    prompt.push_str(&format!(
        "Your partner's apparent sentiment right now: {}\n",
        context.partner_sentiment
    ));
    if context.partner_idle_seconds > 0 {
        prompt.push_str(&format!(
            "Seconds since your partner's last message: {}\n",
            context.partner_idle_seconds
        ));
    }
    prompt.push('\n');
    prompt.push_str(RESPONSE_FORMAT_INSTRUCTIONS);
    prompt.push('\n');
    prompt.push_str(CONVERSATION_GUIDELINES);
    if context.is_idle_prompt {
        prompt.push('\n');
        prompt.push_str(IDLE_PROMPT_ADDITION);
    }

    let messages = memory
        .entries()
        .iter()
        .map(|entry| match entry.role {
            MemoryRole::Partner => LlmMessage::user(entry.speech.clone()),
            MemoryRole::Assistant => LlmMessage::assistant(entry.speech.clone()),
        })
        .collect();

    (prompt, messages)
}

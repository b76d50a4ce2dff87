use thiserror::Error;

/// Errors surfaced by the catalog, conversation-log and config subsystems.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("catalog is empty: {0}")]
    EmptyCatalog(String),

    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("conversation {0} is already ended")]
    ConversationEnded(String),
}

pub type ArenaResult<T> = Result<T, ArenaError>;

/// Failure modes for an LLM backend. Kept separate from [`ArenaError`] since
/// provider failures are expected steady-state events (retried, then
/// swallowed) rather than exceptional conditions.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {0} is not available")]
    Unavailable(String),

    #[error("provider {0} returned an empty response")]
    EmptyResponse(String),

    #[error("provider {0} request failed: {1}")]
    RequestFailed(String, String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        let err = ArenaError::EmptyCatalog("topics".to_string());
        assert_eq!(err.to_string(), "catalog is empty: topics");

        let err = ProviderError::Unavailable("mock".to_string());
        assert_eq!(err.to_string(), "provider mock is not available");
    }
}

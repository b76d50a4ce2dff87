//! Configuration schema and TOML/env loading, mirroring the shape of a
//! typical layered config: a file on disk, overridden by environment
//! variables, with every section falling back to sane defaults.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ArenaResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PairingConfig {
    pub cooldown_seconds: u64,
    pub delayed_pairing_enabled: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 10,
            delayed_pairing_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageConfig {
    pub min_think_chars: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self { min_think_chars: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InactivityConfig {
    pub timeout_seconds: u64,
    pub tick_interval_seconds: u64,
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            tick_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiParticipantsConfig {
    pub enabled: bool,
    pub force_ai_on_odd_users: bool,
    pub max_ai_participants: usize,
    pub default_provider: String,
    pub idle_timeout_seconds: u64,
    pub idle_check_interval_seconds: u64,
    pub response_delay_min_ms: u64,
    pub response_delay_max_ms: u64,
    pub max_retries: u32,
}

impl Default for AiParticipantsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force_ai_on_odd_users: true,
            max_ai_participants: 5,
            default_provider: "mock".to_string(),
            idle_timeout_seconds: 120,
            idle_check_interval_seconds: 30,
            response_delay_min_ms: 500,
            response_delay_max_ms: 3000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("chat-arena"))
        .unwrap_or_else(|| PathBuf::from(".chat-arena"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ArenaConfig {
    pub server: ServerConfig,
    pub pairing: PairingConfig,
    pub message: MessageConfig,
    pub inactivity: InactivityConfig,
    pub ai: AiParticipantsConfig,
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".chat-arena").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Loads configuration from `path`, falling back to defaults when the file
/// does not exist. A parse error on an existing file is propagated — an
/// operator typo should surface, not silently reset to defaults.
pub fn load_config(path: &Path) -> ArenaResult<ArenaConfig> {
    if !path.exists() {
        return Ok(ArenaConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config: ArenaConfig = toml::from_str(&raw)?;
    Ok(config)
}

/// Loads from `CHAT_ARENA_CONFIG` if set, else the platform default path,
/// then layers environment-variable overrides on top.
pub fn load_default_config() -> ArenaResult<ArenaConfig> {
    let path = env::var("CHAT_ARENA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let mut config = load_config(&path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut ArenaConfig) {
    if let Ok(v) = env::var("CHAT_ARENA_HOST") {
        config.server.host = v;
    }
    if let Ok(v) = env::var("CHAT_ARENA_PORT") {
        if let Ok(port) = v.parse() {
            config.server.port = port;
        }
    }
    if let Ok(v) = env::var("CHAT_ARENA_DATA_DIR") {
        config.server.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = env::var("CHAT_ARENA_INACTIVITY_TIMEOUT_SECONDS") {
        if let Ok(secs) = v.parse() {
            config.inactivity.timeout_seconds = secs;
        }
    }
    if let Ok(v) = env::var("CHAT_ARENA_FORCE_AI_ON_ODD_USERS") {
        if let Ok(b) = v.parse() {
            config.ai.force_ai_on_odd_users = b;
        }
    }
    if let Ok(v) = env::var("CHAT_ARENA_AI_DEFAULT_PROVIDER") {
        config.ai.default_provider = v;
    }
}

/// Writes `config` to `path` atomically: write to a sibling `.tmp` file,
/// then rename over the destination.
pub fn save_config(config: &ArenaConfig, path: &Path) -> ArenaResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, serialized)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_spec_values() {
        let config = ArenaConfig::default();
        assert_eq!(config.message.min_think_chars, 10);
        assert_eq!(config.pairing.cooldown_seconds, 10);
        assert_eq!(config.ai.idle_timeout_seconds, 120);
        assert_eq!(config.ai.idle_check_interval_seconds, 30);
        assert_eq!(config.ai.response_delay_min_ms, 500);
        assert_eq!(config.ai.response_delay_max_ms, 3000);
        assert_eq!(config.ai.max_ai_participants, 5);
        assert!(config.ai.force_ai_on_odd_users);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, ArenaConfig::default());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = ArenaConfig::default();
        config.server.port = 9999;
        config.ai.max_ai_participants = 2;
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn malformed_existing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(load_config(&path).is_err());
    }
}

//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier sent with every outbound message.
    pub sender_id: String,
    /// Maximum accepted message length, in characters.
    pub max_message_chars: usize,
    /// Conversation previews are truncated to this many characters.
    pub preview_chars: usize,
    /// A fetched record may supersede a local entry only if it is no older than
    /// the local timestamp minus this window.
    pub clock_skew: Duration,
    /// Route of the generic (non-specific) chat entry point.
    pub generic_route: String,
    /// Broadcast channel capacity for session events.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sender_id: "local-user".to_string(),
            max_message_chars: 8_000,
            preview_chars: 80,
            clock_skew: Duration::from_secs(300), // 5 minutes
            generic_route: "/chat".to_string(),
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Build from `CHAT_STATE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(sender) = std::env::var("CHAT_STATE_SENDER_ID") {
            config.sender_id = sender;
        }
        if let Some(max) = parse_env::<usize>("CHAT_STATE_MAX_MESSAGE_CHARS")? {
            config.max_message_chars = max;
        }
        if let Some(chars) = parse_env::<usize>("CHAT_STATE_PREVIEW_CHARS")? {
            config.preview_chars = chars;
        }
        if let Ok(route) = std::env::var("CHAT_STATE_GENERIC_ROUTE") {
            config.generic_route = route;
        }

        Ok(config)
    }
}

/// Backend connection settings for the HTTP transport.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_token: Option<secrecy::SecretString>,
    /// Path of the JSON file used for thread persistence.
    pub store_path: PathBuf,
}

impl BackendConfig {
    /// Read `CHAT_STATE_API_URL` (required), `CHAT_STATE_API_TOKEN` and `CHAT_STATE_STORE_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("CHAT_STATE_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("CHAT_STATE_API_URL".to_string()))?;
        let api_token = std::env::var("CHAT_STATE_API_TOKEN")
            .ok()
            .map(secrecy::SecretString::from);
        let store_path = std::env::var("CHAT_STATE_STORE_PATH")
            .unwrap_or_else(|_| "./data/chat-state.json".to_string())
            .into();

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            store_path,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

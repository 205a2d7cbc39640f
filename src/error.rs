//! Error types for the chat state layer.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Input rejected before a message is created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    Empty,

    #[error("Message too long: {length} > {max} characters")]
    TooLong { length: usize, max: usize },

    #[error("No active conversation")]
    NoActiveConversation,
}

/// Transport failures. Any of these moves a pending message to failed.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Durable key/value storage failures. Persistence is best-effort, so these
/// are logged by the caller and never reach the top-level [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to write key {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Failed to read storage: {reason}")]
    ReadFailed { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Store operations addressed to unknown entities or invalid transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Message {id} not found")]
    MessageNotFound { id: String },

    #[error("Message {id} already exists")]
    DuplicateMessage { id: String },

    #[error("Conversation {id} not found")]
    ConversationNotFound { id: String },

    #[error("Conversation {id} already exists")]
    DuplicateConversation { id: String },

    #[error("Message {id} is {state}, cannot transition to {target}")]
    InvalidTransition {
        id: String,
        state: String,
        target: String,
    },
}

/// Configuration-related errors. Raised only while building the binary's
/// configuration, before a session exists.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

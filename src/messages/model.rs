//! Message data model — roles, lifecycle status, and typed metadata.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::reminders::ReminderIntent;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[serde(alias = "bot", alias = "agent")]
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" | "bot" | "agent" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Rendered locally, send in flight.
    Pending,
    /// Confirmed by the backend.
    Sent,
    /// Send failed; stays visible with a retry affordance.
    Failed,
}

impl MessageStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: MessageStatus) -> bool {
        use MessageStatus::*;

        matches!(
            (self, target),
            (Pending, Sent) | (Pending, Failed) | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Where the current representation of a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    /// Authored or recorded by this client, not yet matched to a fetched record.
    Local,
    /// Taken from a fetched history snapshot.
    #[default]
    Server,
}

/// An attachment, tagged by kind. Unrecognised kinds decode to `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    File {
        url: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size_bytes: Option<u64>,
    },
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Typed metadata attached to a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Reminder annotation computed at submit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<ReminderIntent>,
    /// Extension fields this client does not interpret.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-generated until the backend assigns one.
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub status: MessageStatus,
    #[serde(default)]
    pub origin: MessageOrigin,
    /// Message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// A locally authored user message awaiting confirmation.
    pub fn optimistic(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: local_message_id(timestamp),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            timestamp,
            status: MessageStatus::Pending,
            origin: MessageOrigin::Local,
            parent_id: None,
            agent_type: None,
            metadata: MessageMetadata::default(),
        }
    }

    /// A confirmed message from a history snapshot.
    pub fn from_server(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            timestamp,
            status: MessageStatus::Sent,
            origin: MessageOrigin::Server,
            parent_id: None,
            agent_type: None,
            metadata: MessageMetadata::default(),
        }
    }

    /// Builder: set role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Builder: set parent message.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Builder: set agent type.
    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// Builder: attach files.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.metadata.attachments = attachments;
        self
    }

    /// Builder: attach a reminder annotation.
    pub fn with_reminder(mut self, intent: ReminderIntent) -> Self {
        self.metadata.reminder = Some(intent);
        self
    }

    pub fn is_local(&self) -> bool {
        self.origin == MessageOrigin::Local
    }
}

/// Generate an optimistic message id: `local-<epoch ms>-<8 random chars>`.
///
/// Two submits in the same millisecond still get distinct ids.
pub fn local_message_id(timestamp: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("local-{timestamp}-{}", suffix.to_lowercase())
}

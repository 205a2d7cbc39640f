//! Backend transport — the two calls the chat state layer depends on.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::messages::{Attachment, Message, Role};

pub use http::HttpTransport;

/// One record of a fetched conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

impl HistoryMessage {
    pub fn into_message(self, conversation_id: &str) -> Message {
        let mut msg = Message::from_server(self.id, conversation_id, self.role, self.content, self.timestamp)
            .with_attachments(self.attachments);
        msg.agent_type = self.agent_type;
        msg
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// The assistant's answer.
    pub answer: String,
    /// Backend id for the sent message. Absent means the local id stands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Backend calls used by the session.
///
/// Implementations own any timeout policy; every call must eventually resolve.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Full history for a conversation (single page).
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<HistoryMessage>, NetworkError>;

    /// Send user text and wait for the answer.
    async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<SendReceipt, NetworkError>;
}

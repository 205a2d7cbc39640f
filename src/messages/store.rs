//! MessageStore — normalized, id-keyed messages with the optimistic lifecycle.

use std::collections::HashMap;

use tracing::debug;

use super::model::{Message, MessageOrigin, MessageStatus, Role};
use super::reconcile::{ReconcileOptions, Superseded, reconcile, sort_for_display};
use crate::error::StateError;

/// In-memory message store. All mutation goes through these methods.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: HashMap<String, Message>,
    options: ReconcileOptions,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReconcileOptions) -> Self {
        Self {
            messages: HashMap::new(),
            options,
        }
    }

    /// Insert a locally authored message as pending. It renders immediately.
    pub fn insert_optimistic(&mut self, mut message: Message) -> Result<(), StateError> {
        if self.messages.contains_key(&message.id) {
            return Err(StateError::DuplicateMessage { id: message.id });
        }
        message.status = MessageStatus::Pending;
        message.origin = MessageOrigin::Local;
        debug!(
            id = %message.id,
            conversation_id = %message.conversation_id,
            "Optimistic message inserted"
        );
        self.messages.insert(message.id.clone(), message);
        Ok(())
    }

    /// Apply an authoritative history snapshot for one conversation.
    ///
    /// Returns the local entries that were replaced.
    pub fn confirm(&mut self, conversation_id: &str, server_messages: Vec<Message>) -> Vec<Superseded> {
        let snapshot: Vec<Message> = server_messages
            .into_iter()
            .map(|mut m| {
                m.conversation_id = conversation_id.to_string();
                m
            })
            .collect();

        let current_ids: Vec<String> = self
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.id.clone())
            .collect();
        let current: Vec<Message> = current_ids
            .iter()
            .filter_map(|id| self.messages.remove(id))
            .collect();

        // A server id may already be held under another conversation; the snapshot wins.
        for record in &snapshot {
            self.messages.remove(&record.id);
        }

        let out = reconcile(current, &snapshot, &self.options);
        debug!(
            conversation_id,
            records = snapshot.len(),
            superseded = out.superseded.len(),
            "History snapshot reconciled"
        );
        for msg in out.messages {
            self.messages.insert(msg.id.clone(), msg);
        }
        out.superseded
    }

    /// Mark a pending message failed. It stays visible.
    pub fn fail(&mut self, message_id: &str) -> Result<(), StateError> {
        self.transition(message_id, MessageStatus::Failed)?;
        debug!(id = message_id, "Message marked failed");
        Ok(())
    }

    /// Move a failed message back to pending for an explicit retry.
    pub fn retry(&mut self, message_id: &str) -> Result<&Message, StateError> {
        self.transition(message_id, MessageStatus::Pending)?;
        debug!(id = message_id, "Message queued for retry");
        self.get(message_id).ok_or_else(|| not_found(message_id))
    }

    /// Mark a pending message sent after a successful send.
    ///
    /// When the backend returned its own id the entry is re-keyed. Returns the
    /// id the message now lives under.
    pub fn mark_sent(&mut self, message_id: &str, server_id: Option<&str>) -> Result<String, StateError> {
        self.transition(message_id, MessageStatus::Sent)?;

        let Some(server_id) = server_id.filter(|s| *s != message_id) else {
            return Ok(message_id.to_string());
        };

        let mut msg = self.messages.remove(message_id).ok_or_else(|| not_found(message_id))?;
        if self.messages.contains_key(server_id) {
            // A fetch already delivered the authoritative copy.
            debug!(id = message_id, server_id, "Sent message already confirmed by fetch");
        } else {
            msg.id = server_id.to_string();
            self.messages.insert(msg.id.clone(), msg);
        }
        Ok(server_id.to_string())
    }

    /// Remove a failed message on explicit user request.
    pub fn dismiss(&mut self, message_id: &str) -> Result<Message, StateError> {
        let msg = self.messages.get(message_id).ok_or_else(|| not_found(message_id))?;
        if msg.status != MessageStatus::Failed {
            return Err(StateError::InvalidTransition {
                id: message_id.to_string(),
                state: msg.status.to_string(),
                target: "dismissed".to_string(),
            });
        }
        debug!(id = message_id, "Failed message dismissed");
        self.messages.remove(message_id).ok_or_else(|| not_found(message_id))
    }

    /// Record the assistant answer returned by a send.
    ///
    /// Skipped when the parent already has this answer, or when a fetched
    /// assistant record with the same content follows the parent (a fetch got
    /// there first). Local replies to other parents never count, so identical
    /// questions each keep their own answer. Returns the new id if inserted.
    pub fn insert_reply(
        &mut self,
        conversation_id: &str,
        parent_id: &str,
        content: &str,
        now_ms: i64,
        agent_type: Option<&str>,
    ) -> Option<String> {
        let after = self.messages.get(parent_id).map(|p| p.timestamp).unwrap_or(i64::MIN);
        let duplicate = self.messages.values().any(|m| {
            m.conversation_id == conversation_id
                && m.role == Role::Assistant
                && m.content == content
                && (m.parent_id.as_deref() == Some(parent_id)
                    || (m.origin == MessageOrigin::Server && m.timestamp >= after))
        });
        if duplicate {
            debug!(conversation_id, parent_id, "Reply already present, skipping");
            return None;
        }

        let timestamp = if after == i64::MIN { now_ms } else { now_ms.max(after + 1) };
        let mut reply = Message::optimistic(conversation_id, content, timestamp)
            .with_role(Role::Assistant)
            .with_parent(parent_id);
        reply.status = MessageStatus::Sent;
        if let Some(agent) = agent_type {
            reply = reply.with_agent_type(agent);
        }
        let id = reply.id.clone();
        self.messages.insert(id.clone(), reply);
        Some(id)
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.get(message_id)
    }

    /// Render-ready messages for a conversation, timestamp ascending.
    pub fn messages_for(&self, conversation_id: &str) -> Vec<Message> {
        let mut list: Vec<Message> = self
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        sort_for_display(&mut list);
        list
    }

    /// Pending messages for a conversation, timestamp ascending.
    pub fn pending_for(&self, conversation_id: &str) -> Vec<Message> {
        let mut list: Vec<Message> = self
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && m.status == MessageStatus::Pending)
            .cloned()
            .collect();
        sort_for_display(&mut list);
        list
    }

    /// Drop everything held for a conversation. Returns the number removed.
    pub fn remove_conversation(&mut self, conversation_id: &str) -> usize {
        let before = self.messages.len();
        self.messages.retain(|_, m| m.conversation_id != conversation_id);
        before - self.messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn transition(&mut self, message_id: &str, target: MessageStatus) -> Result<(), StateError> {
        let msg = self.messages.get_mut(message_id).ok_or_else(|| not_found(message_id))?;
        if !msg.status.can_transition_to(target) {
            return Err(StateError::InvalidTransition {
                id: message_id.to_string(),
                state: msg.status.to_string(),
                target: target.to_string(),
            });
        }
        msg.status = target;
        Ok(())
    }
}

fn not_found(id: &str) -> StateError {
    StateError::MessageNotFound { id: id.to_string() }
}

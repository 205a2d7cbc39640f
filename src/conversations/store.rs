//! ConversationStore — normalized conversations and the active pointer.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone};
use tracing::{debug, info};

use super::grouping::{DateBucket, group_by_date};
use super::model::{Conversation, ConversationStatus, preview};
use crate::error::StateError;

/// Default preview length in characters.
const DEFAULT_PREVIEW_CHARS: usize = 80;

/// In-memory conversation store.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
    /// At most one conversation is active at a time.
    active: Option<String>,
    preview_chars: usize,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_preview_chars(DEFAULT_PREVIEW_CHARS)
    }

    pub fn with_preview_chars(preview_chars: usize) -> Self {
        Self {
            conversations: HashMap::new(),
            active: None,
            preview_chars,
        }
    }

    /// Add a conversation: timestamps set to `now_ms`, no unread, status active.
    pub fn add_conversation(&mut self, mut conversation: Conversation, now_ms: i64) -> Result<String, StateError> {
        if self.conversations.contains_key(&conversation.id) {
            return Err(StateError::DuplicateConversation { id: conversation.id });
        }
        conversation.created_at = now_ms;
        conversation.updated_at = now_ms;
        conversation.unread_count = 0;
        conversation.status = ConversationStatus::Active;

        let id = conversation.id.clone();
        info!(conversation_id = %id, title = %conversation.title, "Conversation added");
        self.conversations.insert(id.clone(), conversation);
        Ok(id)
    }

    /// Load conversations fetched from elsewhere, keeping their timestamps.
    pub fn upsert(&mut self, conversation: Conversation) {
        self.conversations.insert(conversation.id.clone(), conversation);
    }

    /// Record message activity: new preview and `updated_at = now_ms`.
    pub fn touch_on_message(&mut self, conversation_id: &str, preview_text: &str, now_ms: i64) -> Result<(), StateError> {
        let preview_chars = self.preview_chars;
        let conv = self.get_mut(conversation_id)?;
        conv.last_message_preview = Some(preview(preview_text, preview_chars));
        conv.updated_at = now_ms.max(conv.updated_at);
        debug!(conversation_id, updated_at = conv.updated_at, "Conversation touched");
        Ok(())
    }

    /// Switch the active conversation. Returns the previously active id.
    ///
    /// The pointer is replaced in one assignment; the target's unread count is cleared.
    pub fn set_active(&mut self, conversation_id: Option<&str>) -> Result<Option<String>, StateError> {
        if let Some(id) = conversation_id {
            self.get_mut(id)?.unread_count = 0;
        }
        let previous = std::mem::replace(&mut self.active, conversation_id.map(str::to_string));
        debug!(from = ?previous, to = ?self.active, "Active conversation switched");
        Ok(previous)
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_deref().and_then(|id| self.conversations.get(id))
    }

    /// Count an unseen message. Active conversations never accumulate unread.
    pub fn increment_unread(&mut self, conversation_id: &str) -> Result<u32, StateError> {
        let is_active = self.active.as_deref() == Some(conversation_id);
        let conv = self.get_mut(conversation_id)?;
        if !is_active {
            conv.unread_count = conv.unread_count.saturating_add(1);
        }
        Ok(conv.unread_count)
    }

    pub fn rename(&mut self, conversation_id: &str, title: impl Into<String>) -> Result<(), StateError> {
        self.get_mut(conversation_id)?.title = title.into();
        Ok(())
    }

    pub fn set_status(&mut self, conversation_id: &str, status: ConversationStatus) -> Result<(), StateError> {
        self.get_mut(conversation_id)?.status = status;
        info!(conversation_id, %status, "Conversation status changed");
        Ok(())
    }

    /// Remove a conversation, clearing the active pointer if it pointed here.
    pub fn remove(&mut self, conversation_id: &str) -> Result<Conversation, StateError> {
        let conv = self
            .conversations
            .remove(conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        if self.active.as_deref() == Some(conversation_id) {
            self.active = None;
        }
        Ok(conv)
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    /// All conversations, most recently updated first (ties by id).
    pub fn list(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.conversations.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Date-bucketed view, computed against `now` on every call.
    pub fn grouped_by_date<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<DateBucket> {
        group_by_date(&self.list(), now)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    fn get_mut(&mut self, conversation_id: &str) -> Result<&mut Conversation, StateError> {
        self.conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found(conversation_id))
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &str) -> StateError {
    StateError::ConversationNotFound { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(ids: &[&str]) -> ConversationStore {
        let mut store = ConversationStore::new();
        for (i, id) in ids.iter().enumerate() {
            store
                .add_conversation(Conversation::new(format!("Chat {id}"), 0).with_id(*id), i as i64 * 10)
                .unwrap();
        }
        store
    }

    #[test]
    fn add_resets_bookkeeping() {
        let mut store = ConversationStore::new();
        let mut conv = Conversation::new("t", 5).with_id("c1");
        conv.unread_count = 9;
        conv.status = ConversationStatus::Archived;
        store.add_conversation(conv, 1_000).unwrap();

        let stored = store.get("c1").unwrap();
        assert_eq!(stored.created_at, 1_000);
        assert_eq!(stored.updated_at, 1_000);
        assert_eq!(stored.unread_count, 0);
        assert_eq!(stored.status, ConversationStatus::Active);
    }

    #[test]
    fn duplicate_add_rejected() {
        let mut store = store_with(&["c1"]);
        let err = store.add_conversation(Conversation::new("x", 0).with_id("c1"), 1).unwrap_err();
        assert_eq!(err, StateError::DuplicateConversation { id: "c1".into() });
    }

    #[test]
    fn list_sorted_by_updated_desc() {
        let store = store_with(&["a", "b", "c"]);
        let ids: Vec<String> = store.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn touch_resorts() {
        let mut store = store_with(&["a", "b", "c"]);
        store.touch_on_message("a", "newest message", 100).unwrap();

        let list = store.list();
        assert_eq!(list[0].id, "a");
        assert_eq!(list[0].last_message_preview.as_deref(), Some("newest message"));
        assert_eq!(list[0].updated_at, 100);
    }

    #[test]
    fn touch_truncates_preview() {
        let mut store = ConversationStore::with_preview_chars(6);
        store.add_conversation(Conversation::new("t", 0).with_id("c1"), 0).unwrap();
        store.touch_on_message("c1", "a rather long message", 1).unwrap();
        assert_eq!(store.get("c1").unwrap().last_message_preview.as_deref(), Some("a rat…"));
    }

    #[test]
    fn touch_unknown_conversation() {
        let mut store = ConversationStore::new();
        assert!(matches!(
            store.touch_on_message("nope", "x", 1),
            Err(StateError::ConversationNotFound { .. })
        ));
    }

    #[test]
    fn single_active_pointer() {
        let mut store = store_with(&["a", "b"]);
        assert_eq!(store.set_active(Some("a")).unwrap(), None);
        assert_eq!(store.set_active(Some("b")).unwrap(), Some("a".to_string()));
        assert_eq!(store.active_conversation_id(), Some("b"));

        // Unknown target leaves the pointer untouched.
        assert!(store.set_active(Some("zzz")).is_err());
        assert_eq!(store.active_conversation_id(), Some("b"));

        assert_eq!(store.set_active(None).unwrap(), Some("b".to_string()));
        assert!(store.active().is_none());
    }

    #[test]
    fn unread_counts_only_inactive() {
        let mut store = store_with(&["a", "b"]);
        store.set_active(Some("a")).unwrap();
        assert_eq!(store.increment_unread("a").unwrap(), 0);
        assert_eq!(store.increment_unread("b").unwrap(), 1);
        assert_eq!(store.increment_unread("b").unwrap(), 2);

        store.set_active(Some("b")).unwrap();
        assert_eq!(store.get("b").unwrap().unread_count, 0);
    }

    #[test]
    fn remove_clears_active() {
        let mut store = store_with(&["a", "b"]);
        store.set_active(Some("a")).unwrap();
        store.remove("a").unwrap();
        assert!(store.active_conversation_id().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rename_and_archive() {
        let mut store = store_with(&["a"]);
        store.rename("a", "Renamed").unwrap();
        store.set_status("a", ConversationStatus::Archived).unwrap();
        let conv = store.get("a").unwrap();
        assert_eq!(conv.title, "Renamed");
        assert_eq!(conv.status, ConversationStatus::Archived);
    }
}

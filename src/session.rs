//! ChatSession — the UI-facing entry point over the stores.
//!
//! Store locks are held only while a store operation runs, never across a
//! transport call, so a send and a history fetch for the same conversation
//! can interleave. The reconcile rule keeps the result consistent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::conversations::{Conversation, ConversationStore, DateBucket};
use crate::error::{Error, NetworkError, Result, ValidationError};
use crate::messages::{Attachment, Message, MessageStatus, MessageStore, ReconcileOptions};
use crate::persistence::{KeyValueStore, RestoredThread, ThreadPersistence};
use crate::reminders::ReminderIntentParser;
use crate::transport::{SendReceipt, Transport};

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Change notifications for renderers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A message was added or changed state.
    MessageUpserted { message: Message },
    /// A failed message was dismissed.
    MessageRemoved { conversation_id: String, message_id: String },
    /// A local entry was replaced by its fetched server record.
    MessageSuperseded {
        conversation_id: String,
        local_id: String,
        server_id: String,
    },
    ConversationUpdated { conversation: Conversation },
    ActiveConversationChanged { conversation_id: Option<String> },
    /// Transient, user-visible notification.
    Notice { level: NoticeLevel, text: String },
}

struct ChatState {
    messages: MessageStore,
    conversations: ConversationStore,
    /// Pending local ids a fetch replaced, mapped to their server ids.
    superseded: HashMap<String, String>,
}

/// One user's chat session.
pub struct ChatSession {
    transport: Arc<dyn Transport>,
    state: RwLock<ChatState>,
    persistence: ThreadPersistence,
    parser: ReminderIntentParser,
    config: SessionConfig,
    tx: broadcast::Sender<SessionEvent>,
    /// Local ids of in-flight sends whose answers should not be rendered.
    suppressed: Mutex<HashSet<String>>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn Transport>, kv: Arc<dyn KeyValueStore>, config: SessionConfig) -> Self {
        let (tx, _rx) = broadcast::channel(config.event_capacity.max(1));
        let options = ReconcileOptions {
            clock_skew_ms: i64::try_from(config.clock_skew.as_millis()).unwrap_or(i64::MAX),
        };
        Self {
            transport,
            state: RwLock::new(ChatState {
                messages: MessageStore::with_options(options),
                conversations: ConversationStore::with_preview_chars(config.preview_chars),
                superseded: HashMap::new(),
            }),
            persistence: ThreadPersistence::new(kv, config.generic_route.clone()),
            parser: ReminderIntentParser::default(),
            config,
            tx,
            suppressed: Mutex::new(HashSet::new()),
        }
    }

    /// Builder: use a custom reminder parser.
    pub fn with_parser(mut self, parser: ReminderIntentParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn persistence(&self) -> &ThreadPersistence {
        &self.persistence
    }

    // ── Selectors ───────────────────────────────────────────────────

    /// Render-ready messages for a conversation, timestamp ascending.
    pub async fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.state.read().await.messages.messages_for(conversation_id)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.read().await.conversations.list()
    }

    /// Conversations bucketed relative to `now`.
    pub async fn grouped_conversations<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<DateBucket> {
        self.state.read().await.conversations.grouped_by_date(now)
    }

    pub async fn active_conversation_id(&self) -> Option<String> {
        self.state
            .read()
            .await
            .conversations
            .active_conversation_id()
            .map(str::to_string)
    }

    // ── Conversations ───────────────────────────────────────────────

    /// Make conversations known to the session, keeping their timestamps.
    pub async fn load_conversations(&self, conversations: impl IntoIterator<Item = Conversation>) {
        let mut state = self.state.write().await;
        for conv in conversations {
            state.conversations.upsert(conv);
        }
    }

    /// Create a conversation and make it active.
    pub async fn new_conversation(&self, title: &str, agent_type: Option<&str>) -> Result<String> {
        let mut conv = Conversation::new(title, now_ms());
        if let Some(agent) = agent_type {
            conv = conv.with_agent_type(agent);
        }

        let (id, created) = {
            let mut state = self.state.write().await;
            let id = state.conversations.add_conversation(conv, now_ms())?;
            state.conversations.set_active(Some(&id))?;
            let created = state.conversations.get(&id).cloned();
            (id, created)
        };

        self.persistence.on_route_change(Some(&id), &self.route_for(&id));
        if let Some(conversation) = created {
            self.emit(SessionEvent::ConversationUpdated { conversation });
        }
        self.emit(SessionEvent::ActiveConversationChanged {
            conversation_id: Some(id.clone()),
        });
        Ok(id)
    }

    /// Switch to a conversation, remember it, and load its history.
    ///
    /// A failed fetch leaves the locally held messages in place and is
    /// reported as a notice.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.state.write().await.conversations.set_active(Some(conversation_id))?;
        self.persistence
            .on_route_change(Some(conversation_id), &self.route_for(conversation_id));
        self.emit(SessionEvent::ActiveConversationChanged {
            conversation_id: Some(conversation_id.to_string()),
        });

        match self.refresh(conversation_id).await {
            Ok(messages) => Ok(messages),
            Err(Error::Network(e)) => {
                debug!(conversation_id, error = %e, "Showing cached messages");
                Ok(self.messages(conversation_id).await)
            }
            Err(e) => Err(e),
        }
    }

    /// Redirect to the last viewed conversation if starting on the generic route.
    ///
    /// The stored route is valid only when it names a conversation the session knows.
    pub async fn restore_last_thread(&self, current_route: &str) -> Result<Option<RestoredThread>> {
        let known: HashSet<String> = {
            let state = self.state.read().await;
            state.conversations.list().into_iter().map(|c| c.id).collect()
        };
        let prefix = format!("{}/", self.config.generic_route.trim_end_matches('/'));
        let restored = self.persistence.on_app_start(current_route, |route| {
            route
                .strip_prefix(&prefix)
                .is_some_and(|id| known.contains(id))
        });

        let Some(restored) = restored else {
            return Ok(None);
        };
        self.open_conversation(&restored.conversation_id).await?;
        Ok(Some(restored))
    }

    /// Forget the stored thread and drop all in-memory state.
    pub async fn logout(&self) {
        self.persistence.on_logout();
        let mut state = self.state.write().await;
        state.messages = MessageStore::with_options(ReconcileOptions {
            clock_skew_ms: i64::try_from(self.config.clock_skew.as_millis()).unwrap_or(i64::MAX),
        });
        state.conversations = ConversationStore::with_preview_chars(self.config.preview_chars);
        state.superseded.clear();
        info!("Session cleared on logout");
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Submit text to the active conversation.
    ///
    /// Invalid input is rejected before any message exists. A network failure
    /// is not an error here: the message comes back failed and stays visible
    /// until retried or dismissed.
    pub async fn submit(&self, text: &str) -> Result<Message> {
        self.submit_with_attachments(text, Vec::new()).await
    }

    pub async fn submit_with_attachments(&self, text: &str, attachments: Vec<Attachment>) -> Result<Message> {
        if let Err(e) = self.validate(text) {
            self.notice(NoticeLevel::Warning, e.to_string());
            return Err(e.into());
        }

        let intent = self.parser.parse(text, &Local::now());
        let now = now_ms();

        let message = {
            let mut state = self.state.write().await;
            let Some(conversation_id) = state.conversations.active_conversation_id().map(str::to_string) else {
                drop(state);
                let e = ValidationError::NoActiveConversation;
                self.notice(NoticeLevel::Warning, e.to_string());
                return Err(e.into());
            };

            let mut message = Message::optimistic(&conversation_id, text, now).with_attachments(attachments);
            if let Some(agent) = state.conversations.get(&conversation_id).and_then(|c| c.agent_type.clone()) {
                message = message.with_agent_type(agent);
            }
            if intent.is_reminder {
                debug!(confidence = intent.confidence, "Reminder intent attached");
                message = message.with_reminder(intent);
            }

            state.messages.insert_optimistic(message.clone())?;
            state.conversations.touch_on_message(&conversation_id, text, now)?;
            if let Some(conversation) = state.conversations.get(&conversation_id).cloned() {
                self.emit(SessionEvent::ConversationUpdated { conversation });
            }
            message
        };

        info!(id = %message.id, conversation_id = %message.conversation_id, "Message submitted");
        self.emit(SessionEvent::MessageUpserted {
            message: message.clone(),
        });
        Ok(self.deliver(message).await)
    }

    /// Re-send a failed message. Never happens automatically.
    pub async fn retry(&self, message_id: &str) -> Result<Message> {
        let message = self.state.write().await.messages.retry(message_id)?.clone();
        self.lock_suppressed().remove(message_id);

        info!(id = %message.id, "Retrying message");
        self.emit(SessionEvent::MessageUpserted {
            message: message.clone(),
        });
        Ok(self.deliver(message).await)
    }

    /// Remove a failed message.
    pub async fn dismiss(&self, message_id: &str) -> Result<()> {
        let removed = self.state.write().await.messages.dismiss(message_id)?;
        self.emit(SessionEvent::MessageRemoved {
            conversation_id: removed.conversation_id,
            message_id: removed.id,
        });
        Ok(())
    }

    /// Fetch the authoritative history and reconcile it into the store.
    pub async fn refresh(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let history = match self.transport.fetch_history(conversation_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(conversation_id, error = %e, "History fetch failed");
                self.notice(NoticeLevel::Error, format!("Could not load messages: {e}"));
                return Err(e.into());
            }
        };
        let snapshot: Vec<Message> = history
            .into_iter()
            .map(|record| record.into_message(conversation_id))
            .collect();
        let latest = snapshot.iter().max_by_key(|m| m.timestamp).cloned();

        let (superseded, messages, conversation) = {
            let mut state = self.state.write().await;
            let pending: HashSet<String> = state
                .messages
                .pending_for(conversation_id)
                .into_iter()
                .map(|m| m.id)
                .collect();
            let superseded = state.messages.confirm(conversation_id, snapshot);
            // Sends still in flight settle against the server id.
            for s in superseded.iter().filter(|s| pending.contains(&s.local_id)) {
                state.superseded.insert(s.local_id.clone(), s.server_id.clone());
            }

            let mut conversation = None;
            if let Some(latest) = latest {
                let stale = state
                    .conversations
                    .get(conversation_id)
                    .is_some_and(|c| c.updated_at <= latest.timestamp);
                if stale {
                    state
                        .conversations
                        .touch_on_message(conversation_id, &latest.content, latest.timestamp)?;
                    conversation = state.conversations.get(conversation_id).cloned();
                }
            }
            (superseded, state.messages.messages_for(conversation_id), conversation)
        };

        for s in superseded {
            self.emit(SessionEvent::MessageSuperseded {
                conversation_id: conversation_id.to_string(),
                local_id: s.local_id,
                server_id: s.server_id,
            });
        }
        if let Some(conversation) = conversation {
            self.emit(SessionEvent::ConversationUpdated { conversation });
        }
        Ok(messages)
    }

    /// Stop rendering answers for sends in flight in this conversation.
    ///
    /// The requests themselves keep running. Returns how many were suppressed.
    pub async fn stop_generation(&self, conversation_id: &str) -> usize {
        let pending: Vec<String> = self
            .state
            .read()
            .await
            .messages
            .pending_for(conversation_id)
            .into_iter()
            .map(|m| m.id)
            .collect();

        let count = pending.len();
        self.lock_suppressed().extend(pending);
        if count > 0 {
            info!(conversation_id, count, "Generation stopped");
            self.notice(NoticeLevel::Info, "Generation stopped".to_string());
        }
        count
    }

    // ── Internals ───────────────────────────────────────────────────

    fn validate(&self, text: &str) -> std::result::Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        let length = text.chars().count();
        if length > self.config.max_message_chars {
            return Err(ValidationError::TooLong {
                length,
                max: self.config.max_message_chars,
            });
        }
        Ok(())
    }

    /// Send a pending message and settle it as sent or failed.
    async fn deliver(&self, message: Message) -> Message {
        let result = self
            .transport
            .send_message(
                &message.conversation_id,
                &self.config.sender_id,
                &message.content,
                &message.metadata.attachments,
            )
            .await;

        match result {
            Ok(receipt) => self.apply_receipt(&message, receipt).await,
            Err(e) => self.apply_failure(&message, e).await,
        }
    }

    async fn apply_receipt(&self, sent: &Message, receipt: SendReceipt) -> Message {
        let suppressed = self.lock_suppressed().remove(&sent.id);
        let conversation_id = sent.conversation_id.as_str();
        let now = now_ms();
        let mut events = Vec::new();

        let confirmed = {
            let mut state = self.state.write().await;
            let final_id = match state.messages.mark_sent(&sent.id, receipt.id.as_deref()) {
                Ok(id) => id,
                Err(e) => {
                    // A fetch already replaced the pending entry.
                    debug!(id = %sent.id, error = %e, "Sent message already reconciled");
                    receipt
                        .id
                        .clone()
                        .or_else(|| state.superseded.get(&sent.id).cloned())
                        .unwrap_or_else(|| sent.id.clone())
                }
            };
            state.superseded.remove(&sent.id);
            let confirmed = state
                .messages
                .get(&final_id)
                .cloned()
                .unwrap_or_else(|| settled(sent, MessageStatus::Sent));
            events.push(SessionEvent::MessageUpserted {
                message: confirmed.clone(),
            });

            if suppressed {
                debug!(id = %final_id, "Answer suppressed");
            } else {
                let agent_type = state
                    .conversations
                    .get(conversation_id)
                    .and_then(|c| c.agent_type.clone());
                let reply_id = state.messages.insert_reply(
                    conversation_id,
                    &final_id,
                    &receipt.answer,
                    now,
                    agent_type.as_deref(),
                );
                if let Some(reply) = reply_id.and_then(|id| state.messages.get(&id).cloned()) {
                    events.push(SessionEvent::MessageUpserted { message: reply });
                    if state
                        .conversations
                        .touch_on_message(conversation_id, &receipt.answer, now)
                        .is_ok()
                    {
                        let _ = state.conversations.increment_unread(conversation_id);
                        if let Some(conversation) = state.conversations.get(conversation_id).cloned() {
                            events.push(SessionEvent::ConversationUpdated { conversation });
                        }
                    }
                }
            }
            confirmed
        };

        info!(id = %confirmed.id, conversation_id, "Message sent");
        for event in events {
            self.emit(event);
        }
        confirmed
    }

    async fn apply_failure(&self, sent: &Message, error: NetworkError) -> Message {
        self.lock_suppressed().remove(&sent.id);

        let failed = {
            let mut state = self.state.write().await;
            state.superseded.remove(&sent.id);
            match state.messages.fail(&sent.id) {
                Ok(()) => state.messages.get(&sent.id).cloned(),
                Err(e) => {
                    // A fetch showed the backend has it despite the error.
                    debug!(id = %sent.id, error = %e, "Failed send already reconciled");
                    None
                }
            }
        };

        let Some(failed) = failed else {
            return settled(sent, MessageStatus::Sent);
        };
        warn!(id = %failed.id, error = %error, "Message failed to send");
        self.emit(SessionEvent::MessageUpserted {
            message: failed.clone(),
        });
        self.notice(NoticeLevel::Error, format!("Message not sent: {error}"));
        failed
    }

    fn route_for(&self, conversation_id: &str) -> String {
        format!("{}/{conversation_id}", self.config.generic_route.trim_end_matches('/'))
    }

    fn notice(&self, level: NoticeLevel, text: String) {
        self.emit(SessionEvent::Notice { level, text });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    fn lock_suppressed(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.suppressed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn settled(message: &Message, status: MessageStatus) -> Message {
    let mut message = message.clone();
    message.status = status;
    message
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::messages::{MessageOrigin, Role};
    use crate::persistence::MemoryStore;
    use crate::transport::HistoryMessage;

    /// In-memory backend that records sends into its own history.
    #[derive(Default)]
    struct FakeTransport {
        history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
        fail_sends: AtomicBool,
        fail_fetches: AtomicBool,
        omit_ids: AtomicBool,
        gated: AtomicBool,
        reached: Notify,
        release: Notify,
        counter: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch_history(&self, conversation_id: &str) -> std::result::Result<Vec<HistoryMessage>, NetworkError> {
            if self.fail_fetches.load(Ordering::SeqCst) {
                return Err(NetworkError::RequestFailed {
                    endpoint: "fetch".into(),
                    reason: "offline".into(),
                });
            }
            Ok(self
                .history
                .lock()
                .unwrap()
                .get(conversation_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn send_message(
            &self,
            conversation_id: &str,
            _sender_id: &str,
            text: &str,
            _attachments: &[Attachment],
        ) -> std::result::Result<SendReceipt, NetworkError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(NetworkError::RequestFailed {
                    endpoint: "send".into(),
                    reason: "offline".into(),
                });
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("srv-{n}");
            let answer = format!("echo: {text}");
            let ts = now_ms();
            {
                let mut history = self.history.lock().unwrap();
                let records = history.entry(conversation_id.to_string()).or_default();
                records.push(record(&id, Role::User, text, ts));
                records.push(record(&format!("{id}-a"), Role::Assistant, &answer, ts + 1));
            }

            self.reached.notify_one();
            if self.gated.load(Ordering::SeqCst) {
                self.release.notified().await;
            }

            let id = (!self.omit_ids.load(Ordering::SeqCst)).then_some(id);
            Ok(SendReceipt { answer, id })
        }
    }

    fn record(id: &str, role: Role, content: &str, timestamp: i64) -> HistoryMessage {
        HistoryMessage {
            id: id.to_string(),
            role,
            content: content.to_string(),
            timestamp,
            attachments: vec![],
            agent_type: None,
        }
    }

    fn session_with(transport: Arc<FakeTransport>, kv: Arc<MemoryStore>) -> Arc<ChatSession> {
        Arc::new(ChatSession::new(transport, kv, SessionConfig::default()))
    }

    fn session() -> (Arc<ChatSession>, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::default());
        (session_with(transport.clone(), Arc::new(MemoryStore::new())), transport)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn submit_sends_and_records_reply() {
        let (session, _transport) = session();
        let conv = session.new_conversation("Planning", Some("planner")).await.unwrap();

        let sent = session.submit("hello").await.unwrap();
        assert_eq!(sent.id, "srv-1");
        assert_eq!(sent.status, MessageStatus::Sent);

        let messages = session.messages(&conv).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "echo: hello");
        assert_eq!(messages[1].agent_type.as_deref(), Some("planner"));

        let conversation = &session.conversations().await[0];
        assert_eq!(conversation.last_message_preview.as_deref(), Some("echo: hello"));
        assert_eq!(conversation.unread_count, 0);
    }

    #[tokio::test]
    async fn refresh_after_send_does_not_duplicate() {
        let (session, _transport) = session();
        let conv = session.new_conversation("t", None).await.unwrap();
        session.submit("hello").await.unwrap();

        let messages = session.refresh(&conv).await.unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["srv-1", "srv-1-a"]);
        assert!(messages.iter().all(|m| !m.is_local()));

        // Idempotent.
        assert_eq!(session.refresh(&conv).await.unwrap(), messages);
    }

    #[tokio::test]
    async fn send_without_server_id_keeps_local_id_until_fetch() {
        let (session, transport) = session();
        transport.omit_ids.store(true, Ordering::SeqCst);
        let conv = session.new_conversation("t", None).await.unwrap();

        let sent = session.submit("hello").await.unwrap();
        assert!(sent.id.starts_with("local-"));
        assert_eq!(sent.status, MessageStatus::Sent);

        let messages = session.refresh(&conv).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "srv-1");
    }

    #[tokio::test]
    async fn failed_send_stays_visible_until_retry() {
        let (session, transport) = session();
        let conv = session.new_conversation("t", None).await.unwrap();
        let mut rx = session.subscribe();

        transport.fail_sends.store(true, Ordering::SeqCst);
        let failed = session.submit("hello").await.unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert_eq!(session.messages(&conv).await.len(), 1);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            SessionEvent::Notice { level: NoticeLevel::Error, .. }
        )));

        transport.fail_sends.store(false, Ordering::SeqCst);
        let sent = session.retry(&failed.id).await.unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);
        assert_eq!(session.messages(&conv).await.len(), 2);
    }

    #[tokio::test]
    async fn dismiss_failed_message() {
        let (session, transport) = session();
        let conv = session.new_conversation("t", None).await.unwrap();
        transport.fail_sends.store(true, Ordering::SeqCst);
        let failed = session.submit("hello").await.unwrap();

        let mut rx = session.subscribe();
        session.dismiss(&failed.id).await.unwrap();
        assert!(session.messages(&conv).await.is_empty());
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [SessionEvent::MessageRemoved { .. }]
        ));
    }

    #[tokio::test]
    async fn invalid_input_creates_no_message() {
        let (session, _transport) = session();
        let conv = session.new_conversation("t", None).await.unwrap();
        let mut rx = session.subscribe();

        let err = session.submit("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Empty)));

        let long = "x".repeat(SessionConfig::default().max_message_chars + 1);
        let err = session.submit(&long).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::TooLong { .. })));

        assert!(session.messages(&conv).await.is_empty());
        let notices = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Notice { .. }))
            .count();
        assert_eq!(notices, 2);
    }

    #[tokio::test]
    async fn submit_requires_active_conversation() {
        let (session, _transport) = session();
        let err = session.submit("hello").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NoActiveConversation)
        ));
    }

    #[tokio::test]
    async fn fetch_during_send_converges() {
        let (session, transport) = session();
        transport.gated.store(true, Ordering::SeqCst);
        let conv = session.new_conversation("t", None).await.unwrap();

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("hello").await })
        };
        transport.reached.notified().await;

        let during = session.refresh(&conv).await.unwrap();
        assert_eq!(during.len(), 2);
        assert!(during.iter().all(|m| m.status == MessageStatus::Sent));

        transport.release.notify_one();
        let sent = task.await.unwrap().unwrap();
        assert_eq!(sent.id, "srv-1");

        let after = session.messages(&conv).await;
        assert_eq!(after, during);
    }

    #[tokio::test]
    async fn fetch_during_send_without_receipt_id_settles_on_server_record() {
        let (session, transport) = session();
        transport.gated.store(true, Ordering::SeqCst);
        transport.omit_ids.store(true, Ordering::SeqCst);
        let conv = session.new_conversation("t", None).await.unwrap();

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("hello").await })
        };
        transport.reached.notified().await;
        let during = session.refresh(&conv).await.unwrap();
        assert_eq!(during[0].id, "srv-1");

        transport.release.notify_one();
        let sent = task.await.unwrap().unwrap();
        assert_eq!(sent.id, "srv-1");
        assert_eq!(sent.origin, MessageOrigin::Server);
        assert_eq!(session.messages(&conv).await, during);
    }

    #[tokio::test]
    async fn concurrent_identical_submits_each_get_a_reply() {
        let (session, transport) = session();
        transport.gated.store(true, Ordering::SeqCst);
        let conv = session.new_conversation("t", None).await.unwrap();

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.submit("hi").await })
            })
            .collect();
        transport.reached.notified().await;
        transport.reached.notified().await;
        transport.release.notify_waiters();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().status, MessageStatus::Sent);
        }

        let messages = session.messages(&conv).await;
        assert_eq!(messages.len(), 4);
        let replies: Vec<_> = messages.iter().filter(|m| m.role == Role::Assistant).collect();
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|m| m.content == "echo: hi"));
        assert_ne!(replies[0].parent_id, replies[1].parent_id);
    }

    #[tokio::test]
    async fn stop_generation_suppresses_answer() {
        let (session, transport) = session();
        transport.gated.store(true, Ordering::SeqCst);
        let conv = session.new_conversation("t", None).await.unwrap();

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("long question").await })
        };
        transport.reached.notified().await;
        assert_eq!(session.stop_generation(&conv).await, 1);

        transport.release.notify_one();
        let sent = task.await.unwrap().unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);

        let messages = session.messages(&conv).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn reply_to_background_conversation_counts_unread() {
        let (session, transport) = session();
        transport.gated.store(true, Ordering::SeqCst);
        let first = session.new_conversation("first", None).await.unwrap();

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("hello").await })
        };
        transport.reached.notified().await;
        let second = session.new_conversation("second", None).await.unwrap();

        transport.release.notify_one();
        task.await.unwrap().unwrap();

        let conversations = session.conversations().await;
        let first_conv = conversations.iter().find(|c| c.id == first).unwrap();
        let second_conv = conversations.iter().find(|c| c.id == second).unwrap();
        assert_eq!(first_conv.unread_count, 1);
        assert_eq!(second_conv.unread_count, 0);

        session.open_conversation(&first).await.unwrap();
        let conversations = session.conversations().await;
        assert_eq!(conversations.iter().find(|c| c.id == first).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn reminder_text_is_annotated() {
        let (session, _transport) = session();
        session.new_conversation("t", None).await.unwrap();

        let sent = session.submit("remind me to call Alice tomorrow at 3pm").await.unwrap();
        let intent = sent.metadata.reminder.expect("reminder attached");
        assert!(intent.is_reminder);
        assert!(intent.confidence >= 0.9);

        let plain = session.submit("thanks, that's all").await.unwrap();
        assert!(plain.metadata.reminder.is_none());
    }

    #[tokio::test]
    async fn open_with_failed_fetch_keeps_cache() {
        let (session, transport) = session();
        let conv = session.new_conversation("t", None).await.unwrap();
        session.submit("hello").await.unwrap();

        transport.fail_fetches.store(true, Ordering::SeqCst);
        let messages = session.open_conversation(&conv).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(session.refresh(&conv).await.is_err());
    }

    #[tokio::test]
    async fn open_unknown_conversation_fails() {
        let (session, _transport) = session();
        assert!(matches!(
            session.open_conversation("missing").await,
            Err(Error::State(_))
        ));
    }

    #[tokio::test]
    async fn restores_last_thread_in_new_session() {
        let transport = Arc::new(FakeTransport::default());
        let kv = Arc::new(MemoryStore::new());

        let first = session_with(transport.clone(), kv.clone());
        let conv = first.new_conversation("Trip", None).await.unwrap();
        first.submit("pack list").await.unwrap();
        let known = first.conversations().await;

        let second = session_with(transport.clone(), kv.clone());
        second.load_conversations(known).await;
        let restored = second.restore_last_thread("/chat").await.unwrap().unwrap();
        assert_eq!(restored.conversation_id, conv);
        assert_eq!(restored.route, format!("/chat/{conv}"));
        assert_eq!(second.active_conversation_id().await.as_deref(), Some(conv.as_str()));
        assert_eq!(second.messages(&conv).await.len(), 2);

        // Once per session.
        assert!(second.restore_last_thread("/chat").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_unknown_conversation_falls_back() {
        let transport = Arc::new(FakeTransport::default());
        let kv = Arc::new(MemoryStore::new());
        let first = session_with(transport.clone(), kv.clone());
        first.new_conversation("gone", None).await.unwrap();

        let second = session_with(transport, kv.clone());
        assert!(second.restore_last_thread("/chat").await.unwrap().is_none());
        assert!(second.active_conversation_id().await.is_none());
        assert!(!kv.snapshot().contains_key("lastRoute"));
    }

    #[tokio::test]
    async fn restore_with_mismatched_keys_falls_back() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("schemaVersion", "1").unwrap();
        kv.set("lastConversationId", "b").unwrap();
        kv.set("lastRoute", "/chat/a").unwrap();

        let session = session_with(Arc::new(FakeTransport::default()), kv.clone());
        session
            .load_conversations([Conversation::new("a", now_ms()).with_id("a")])
            .await;

        assert!(session.restore_last_thread("/chat").await.unwrap().is_none());
        assert!(session.active_conversation_id().await.is_none());
        let saved = kv.snapshot();
        assert!(!saved.contains_key("lastConversationId"));
        assert!(!saved.contains_key("lastRoute"));
    }

    #[tokio::test]
    async fn grouped_conversations_bucket_today() {
        let (session, _transport) = session();
        session.new_conversation("a", None).await.unwrap();
        session.new_conversation("b", None).await.unwrap();

        let buckets = session.grouped_conversations(&Utc::now()).await;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].label, "Today");
        assert_eq!(buckets[0].conversations.len(), 2);
    }

    #[tokio::test]
    async fn logout_clears_state() {
        let (session, _transport) = session();
        session.new_conversation("a", None).await.unwrap();
        session.logout().await;
        assert!(session.conversations().await.is_empty());
        assert!(session.persistence().on_app_start("/chat", |_| true).is_none());
    }
}

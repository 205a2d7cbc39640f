//! Merging an authoritative history snapshot into locally held messages.
//!
//! `reconcile` is a pure reducer over `(current, snapshot)`. Matching rules:
//!
//! 1. A local entry whose id appears in the snapshot is superseded by that record.
//! 2. A snapshot record the store has never seen as a server record may supersede
//!    one remaining local entry (pending or locally sent, never failed) with the
//!    same role and content. Earliest local entry first, and only if the record is
//!    not older than the entry minus the clock-skew window.
//! 3. Every snapshot record is stored as `sent`/`server`. Known server records
//!    missing from the snapshot are kept, so a stale fetch never deletes.
//!
//! Applying the same snapshot twice is a no-op the second time.

use std::collections::{HashMap, HashSet};

use super::model::{Message, MessageOrigin, MessageStatus};

/// Tuning for snapshot matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// How much older than a local entry a server record may be and still match it.
    pub clock_skew_ms: i64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            clock_skew_ms: 5 * 60 * 1000,
        }
    }
}

/// A local entry replaced by a server record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superseded {
    pub local_id: String,
    pub server_id: String,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Display-ordered messages: by timestamp, then id.
    pub messages: Vec<Message>,
    pub superseded: Vec<Superseded>,
}

/// Merge `snapshot` into `current` (messages of a single conversation).
pub fn reconcile(current: Vec<Message>, snapshot: &[Message], options: &ReconcileOptions) -> Reconciled {
    let mut servers: HashMap<String, Message> = HashMap::new();
    let mut locals: Vec<Message> = Vec::new();
    for msg in current {
        match msg.origin {
            MessageOrigin::Server => {
                servers.insert(msg.id.clone(), msg);
            }
            MessageOrigin::Local => locals.push(msg),
        }
    }
    sort_for_display(&mut locals);

    // Last record wins when the snapshot repeats an id.
    let mut records: Vec<Message> = {
        let mut by_id: HashMap<&str, &Message> = HashMap::new();
        for record in snapshot {
            by_id.insert(&record.id, record);
        }
        by_id.into_values().cloned().collect()
    };
    sort_for_display(&mut records);

    let snapshot_ids: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
    let mut superseded = Vec::new();
    // Local entries carried into the record that replaces them.
    let mut carried: HashMap<String, Message> = HashMap::new();

    // Rule 1: identity.
    locals.retain(|local| {
        if snapshot_ids.contains(&local.id) {
            superseded.push(Superseded {
                local_id: local.id.clone(),
                server_id: local.id.clone(),
            });
            carried.insert(local.id.clone(), local.clone());
            false
        } else {
            true
        }
    });

    // Rule 2: content, one-to-one, only for records new to this store.
    for record in &records {
        if servers.contains_key(&record.id) || carried.contains_key(&record.id) {
            continue;
        }
        let found = locals.iter().position(|local| {
            local.status != MessageStatus::Failed
                && local.role == record.role
                && local.content == record.content
                && record.timestamp >= local.timestamp - options.clock_skew_ms
        });
        if let Some(idx) = found {
            let local = locals.remove(idx);
            superseded.push(Superseded {
                local_id: local.id.clone(),
                server_id: record.id.clone(),
            });
            carried.insert(record.id.clone(), local);
        }
    }

    // Rule 3: records overwrite.
    for record in records {
        let previous = carried.remove(&record.id).or_else(|| servers.remove(&record.id));
        let merged = confirmed(record, previous.as_ref());
        servers.insert(merged.id.clone(), merged);
    }

    let mut messages: Vec<Message> = servers.into_values().chain(locals).collect();
    sort_for_display(&mut messages);

    Reconciled {
        messages,
        superseded,
    }
}

/// A snapshot record as stored, keeping client-side annotations it lacks.
fn confirmed(mut record: Message, previous: Option<&Message>) -> Message {
    record.status = MessageStatus::Sent;
    record.origin = MessageOrigin::Server;
    if let Some(prev) = previous {
        if record.metadata.reminder.is_none() {
            record.metadata.reminder = prev.metadata.reminder.clone();
        }
        if record.metadata.attachments.is_empty() {
            record.metadata.attachments = prev.metadata.attachments.clone();
        }
        if record.parent_id.is_none() {
            record.parent_id = prev.parent_id.clone();
        }
        if record.agent_type.is_none() {
            record.agent_type = prev.agent_type.clone();
        }
    }
    record
}

/// Timestamp ascending, id as tie-breaker.
pub fn sort_for_display(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

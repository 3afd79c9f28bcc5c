//! Ordered, deduplicated message list for the active conversation.
//!
//! Entries are append-only in arrival order. The one exception is the history
//! seed, which replaces the list in `created_at` order and then re-appends
//! whatever arrived while the fetch was in flight and is not already part of
//! the history.

use crate::backend::StoredMessage;
use crate::channel::LiveMessage;
use crate::state::{ChatMessage, MessageDeliveryState};

pub(super) struct MessageStore {
    my_user_id: String,
    conversation_id: Option<String>,
    entries: Vec<ChatMessage>,
    // Survives `reset` so handles stay unique across chat switches.
    next_local_id: u64,
    echo_window_ms: i64,
}

impl MessageStore {
    pub(super) fn new(my_user_id: impl Into<String>, echo_window_ms: i64) -> Self {
        Self {
            my_user_id: my_user_id.into(),
            conversation_id: None,
            entries: Vec::new(),
            next_local_id: 0,
            echo_window_ms,
        }
    }

    pub(super) fn reset(&mut self, conversation_id: Option<String>) {
        self.conversation_id = conversation_id;
        self.entries.clear();
    }

    pub(super) fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub(super) fn get(&self, local_id: u64) -> Option<&ChatMessage> {
        self.entries.iter().find(|m| m.local_id == local_id)
    }

    fn next_id(&mut self) -> u64 {
        self.next_local_id += 1;
        self.next_local_id
    }

    fn position(&self, local_id: u64) -> Option<usize> {
        self.entries.iter().position(|m| m.local_id == local_id)
    }

    /// Replace the contents with `history`, then carry over entries that
    /// arrived during the fetch and are not represented in it.
    pub(super) fn load_history(&mut self, mut history: Vec<StoredMessage>) {
        history.sort_by_key(|m| m.created_at);
        let in_flight = std::mem::take(&mut self.entries);

        for stored in history {
            let local_id = self.next_id();
            self.entries.push(ChatMessage {
                local_id,
                is_mine: stored.sender_id == self.my_user_id,
                server_id: Some(stored.id),
                sender_id: stored.sender_id,
                receiver_id: stored.receiver_id,
                conversation_id: stored.conversation_id,
                text: stored.text,
                created_at: stored.created_at.timestamp_millis(),
                delivery: MessageDeliveryState::Persisted,
            });
        }

        for msg in in_flight {
            let represented = if msg.is_mine && msg.server_id.is_none() {
                // Not yet persisted, so history cannot hold it.
                false
            } else {
                self.is_duplicate(
                    msg.server_id.as_deref(),
                    &msg.sender_id,
                    &msg.conversation_id,
                    &msg.text,
                    msg.created_at,
                )
            };
            if represented {
                tracing::debug!(local_id = msg.local_id, "in-flight entry already in history");
            } else {
                self.entries.push(msg);
            }
        }
    }

    /// Optimistic append of an outgoing message. Returns its handle.
    pub(super) fn append_local(
        &mut self,
        conversation_id: &str,
        receiver_id: &str,
        text: &str,
        now: i64,
    ) -> u64 {
        let local_id = self.next_id();
        self.entries.push(ChatMessage {
            local_id,
            server_id: None,
            sender_id: self.my_user_id.clone(),
            receiver_id: Some(receiver_id.to_string()),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
            created_at: now,
            is_mine: true,
            delivery: MessageDeliveryState::Pending,
        });
        local_id
    }

    /// Put back an outgoing message tracked outside the store (pending or
    /// failed send of a chat that was switched away from).
    pub(super) fn restore_local(&mut self, msg: ChatMessage) -> bool {
        if self.conversation_id.as_deref() != Some(msg.conversation_id.as_str())
            || self.position(msg.local_id).is_some()
        {
            return false;
        }
        if let Some(server_id) = msg.server_id.as_deref() {
            if self
                .entries
                .iter()
                .any(|m| m.server_id.as_deref() == Some(server_id))
            {
                return false;
            }
        }
        self.entries.push(msg);
        true
    }

    /// Append a stream-delivered message unless it is already present or
    /// belongs to another conversation. Returns the new handle.
    pub(super) fn append_remote(&mut self, msg: &LiveMessage, arrived_at: i64) -> Option<u64> {
        if self.conversation_id.as_deref() != Some(msg.conversation_id.as_str()) {
            return None;
        }
        if self.is_duplicate(
            msg.message_id.as_deref(),
            &msg.sender_id,
            &msg.conversation_id,
            &msg.text,
            arrived_at,
        ) {
            tracing::debug!(
                chat_id = %msg.conversation_id,
                has_id = msg.message_id.is_some(),
                "dropping duplicate live message"
            );
            return None;
        }
        let local_id = self.next_id();
        self.entries.push(ChatMessage {
            local_id,
            server_id: msg.message_id.clone(),
            is_mine: msg.sender_id == self.my_user_id,
            sender_id: msg.sender_id.clone(),
            receiver_id: Some(msg.receiver_id.clone()),
            conversation_id: msg.conversation_id.clone(),
            text: msg.text.clone(),
            created_at: arrived_at,
            delivery: MessageDeliveryState::Persisted,
        });
        Some(local_id)
    }

    /// An id-bearing candidate matches by id only. Content match inside the
    /// echo window applies only when the candidate itself has no id.
    fn is_duplicate(
        &self,
        server_id: Option<&str>,
        sender_id: &str,
        conversation_id: &str,
        text: &str,
        at: i64,
    ) -> bool {
        self.entries.iter().any(|m| match server_id {
            Some(id) => m.server_id.as_deref() == Some(id),
            None => {
                m.sender_id == sender_id
                    && m.conversation_id == conversation_id
                    && m.text == text
                    && (m.created_at - at).abs() <= self.echo_window_ms
            }
        })
    }

    /// Mark an optimistic entry as saved. If the saved copy is already in the
    /// list (history raced the save) the optimistic entry is dropped instead.
    pub(super) fn reconcile(&mut self, local_id: u64, persisted: &StoredMessage) -> bool {
        let Some(pos) = self.position(local_id) else {
            return false;
        };
        let already_listed = self
            .entries
            .iter()
            .any(|m| m.local_id != local_id && m.server_id.as_deref() == Some(persisted.id.as_str()));
        if already_listed {
            self.entries.remove(pos);
            return true;
        }
        let entry = &mut self.entries[pos];
        entry.server_id = Some(persisted.id.clone());
        entry.delivery = MessageDeliveryState::Persisted;
        true
    }

    pub(super) fn mark_failed(&mut self, local_id: u64, reason: impl Into<String>) -> bool {
        let Some(pos) = self.position(local_id) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        if entry.persisted() {
            return false;
        }
        entry.delivery = MessageDeliveryState::Failed {
            reason: reason.into(),
        };
        true
    }

    /// Failed -> Pending for a retry.
    pub(super) fn mark_pending(&mut self, local_id: u64) -> bool {
        let Some(pos) = self.position(local_id) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        if !entry.failed() {
            return false;
        }
        entry.delivery = MessageDeliveryState::Pending;
        true
    }

    /// Remove a failed entry. Pending and persisted entries are never removed.
    pub(super) fn discard(&mut self, local_id: u64) -> bool {
        match self.position(local_id) {
            Some(pos) if self.entries[pos].failed() => {
                self.entries.remove(pos);
                true
            }
            _ => false,
        }
    }
}

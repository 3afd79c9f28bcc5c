//! Outgoing message pipeline bookkeeping.
//!
//! `Composing` lives in the draft; an accepted send enters `Sending` here and
//! leaves as `Persisted` (dropped from the outbox) or stays as `Failed` until
//! retried or discarded. Entries are keyed by store handle and outlive chat
//! switches so a re-opened chat can show them again.

use std::collections::HashMap;

use crate::backend::OutgoingMessage;
use crate::error::ValidationError;
use crate::state::{ChatMessage, MessageDeliveryState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SendPhase {
    Sending,
    Failed,
}

#[derive(Debug, Clone)]
pub(super) struct PendingSend {
    pub(super) message: ChatMessage,
    pub(super) phase: SendPhase,
}

impl PendingSend {
    pub(super) fn request(&self) -> OutgoingMessage {
        OutgoingMessage {
            sender_id: self.message.sender_id.clone(),
            text: self.message.text.clone(),
            conversation_id: self.message.conversation_id.clone(),
        }
    }
}

/// Trim and reject empty input before anything touches the network.
pub(super) fn prepare_text(raw: &str) -> Result<String, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(text.to_string())
}

#[derive(Debug, Default)]
pub(super) struct Outbox {
    sends: HashMap<u64, PendingSend>,
}

impl Outbox {
    /// Track a freshly accepted send. Returns the persist request body.
    pub(super) fn begin(&mut self, message: ChatMessage) -> OutgoingMessage {
        let send = PendingSend {
            message,
            phase: SendPhase::Sending,
        };
        let request = send.request();
        self.sends.insert(send.message.local_id, send);
        request
    }

    #[cfg(test)]
    pub(super) fn phase(&self, local_id: u64) -> Option<SendPhase> {
        self.sends.get(&local_id).map(|p| p.phase)
    }

    /// Sending -> Persisted. The send leaves the outbox.
    pub(super) fn persisted(&mut self, local_id: u64) -> Option<PendingSend> {
        match self.sends.get(&local_id) {
            Some(p) if p.phase == SendPhase::Sending => self.sends.remove(&local_id),
            _ => None,
        }
    }

    /// Sending -> Failed.
    pub(super) fn failed(&mut self, local_id: u64, reason: &str) -> bool {
        let Some(p) = self.sends.get_mut(&local_id) else {
            return false;
        };
        if p.phase != SendPhase::Sending {
            return false;
        }
        p.phase = SendPhase::Failed;
        p.message.delivery = MessageDeliveryState::Failed {
            reason: reason.to_string(),
        };
        true
    }

    /// Failed -> Sending. Returns the send to re-persist.
    pub(super) fn retry(&mut self, chat_id: &str, local_id: u64) -> Option<PendingSend> {
        let p = self.sends.get_mut(&local_id)?;
        if p.phase != SendPhase::Failed || p.message.conversation_id != chat_id {
            return None;
        }
        p.phase = SendPhase::Sending;
        p.message.delivery = MessageDeliveryState::Pending;
        Some(p.clone())
    }

    /// Drop a failed send of `chat_id`.
    pub(super) fn discard(&mut self, chat_id: &str, local_id: u64) -> bool {
        match self.sends.get(&local_id) {
            Some(p) if p.phase == SendPhase::Failed && p.message.conversation_id == chat_id => {
                self.sends.remove(&local_id).is_some()
            }
            _ => false,
        }
    }

    /// Unfinished sends for `chat_id`, oldest first.
    pub(super) fn for_chat(&self, chat_id: &str) -> Vec<ChatMessage> {
        let mut out: Vec<ChatMessage> = self
            .sends
            .values()
            .filter(|p| p.message.conversation_id == chat_id)
            .map(|p| p.message.clone())
            .collect();
        out.sort_by_key(|m| m.local_id);
        out
    }

    pub(super) fn clear(&mut self) {
        self.sends.clear();
    }
}

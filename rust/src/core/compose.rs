use super::outbox::prepare_text;
use super::AppCore;
use crate::backend::{OutgoingMessage, StoredMessage};
use crate::channel::{ChannelEvent, LiveMessage, TypingSignal};
use crate::error::{FetchError, ValidationError};
use crate::state::{now_millis, ChatMessage};
use crate::updates::InternalEvent;

impl AppCore {
    pub(super) fn update_draft(&mut self, chat_id: &str, text: String) {
        let Ok((_, partner_id)) = self.composer_target(chat_id) else {
            tracing::debug!(%chat_id, "draft for inactive chat ignored");
            return;
        };
        let Some(session) = self.session.as_ref() else {
            return;
        };

        if !text.trim().is_empty() {
            let signal = TypingSignal {
                sender_id: session.ctx.user_id.clone(),
                receiver_id: partner_id,
            };
            if let Err(e) = session.channel.emit(ChannelEvent::Typing(signal)) {
                tracing::debug!(err = %e, "typing signal dropped");
            }
        }

        if let Some(chat) = self.state.current_chat.as_mut() {
            chat.draft = text;
        }
        self.emit_state();
    }

    pub(super) fn send_message(&mut self, chat_id: &str, content: &str) {
        if !self.is_logged_in() {
            self.toast("Please log in first");
            return;
        }
        let (chat_id, partner_id) = match self.composer_target(chat_id) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(err = %e, "send rejected");
                self.toast("No conversation selected");
                return;
            }
        };
        let text = match prepare_text(content) {
            Ok(text) => text,
            Err(ValidationError::EmptyMessage) => {
                tracing::debug!(%chat_id, "empty message ignored");
                return;
            }
            Err(e) => {
                self.toast(e.to_string());
                return;
            }
        };

        let local_id = self
            .store
            .append_local(&chat_id, &partner_id, &text, now_millis());
        let Some(message) = self.store.get(local_id).cloned() else {
            return;
        };
        self.notify_partner(&message);
        let request = self.outbox.begin(message);
        if let Some(chat) = self.state.current_chat.as_mut() {
            chat.draft.clear();
        }
        self.emit_chat();

        self.spawn_persist(local_id, request);
    }

    pub(super) fn retry_message(&mut self, chat_id: &str, local_id: u64) {
        let Ok((chat_id, _)) = self.composer_target(chat_id) else {
            self.toast("No conversation selected");
            return;
        };
        let Some(send) = self.outbox.retry(&chat_id, local_id) else {
            self.toast("Nothing to retry");
            return;
        };
        tracing::info!(%chat_id, local_id, "retrying send");
        self.store.mark_pending(local_id);
        self.emit_chat();
        self.spawn_persist(local_id, send.request());
    }

    pub(super) fn discard_message(&mut self, chat_id: &str, local_id: u64) {
        let Ok((chat_id, _)) = self.composer_target(chat_id) else {
            self.toast("No conversation selected");
            return;
        };
        if !self.outbox.discard(&chat_id, local_id) {
            self.toast("Nothing to discard");
            return;
        }
        self.store.discard(local_id);
        self.emit_chat();
    }

    fn spawn_persist(&self, local_id: u64, request: OutgoingMessage) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let seq = session.seq;
        let backend = session.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.post_message(&request).await;
            Self::send_internal(
                &tx,
                InternalEvent::PersistResult {
                    session: seq,
                    local_id,
                    result,
                },
            );
        });
    }

    pub(super) fn on_persist_result(
        &mut self,
        local_id: u64,
        result: Result<StoredMessage, FetchError>,
    ) {
        match result {
            Ok(saved) => {
                let Some(send) = self.outbox.persisted(local_id) else {
                    tracing::debug!(local_id, "persist result for unknown send");
                    return;
                };
                tracing::debug!(local_id, server_id = %saved.id, "message persisted");
                self.store.reconcile(local_id, &saved);
                self.spawn_mark_unread(send.message.conversation_id.clone());
                self.emit_chat();
            }
            Err(e) => {
                tracing::warn!(local_id, err = %e, "message persist failed");
                let reason = e.to_string();
                if self.outbox.failed(local_id, &reason) {
                    self.store.mark_failed(local_id, reason);
                }
                self.state.toast = Some(e.notice("Message not saved!"));
                self.emit_chat();
            }
        }
    }

    /// Best-effort live notification, sent alongside the persist call. The
    /// persisted copy is authoritative, so a dropped emit is only logged.
    fn notify_partner(&self, message: &ChatMessage) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(receiver_id) = message.receiver_id.clone() else {
            return;
        };
        let event = ChannelEvent::SendMessage(LiveMessage {
            sender_id: message.sender_id.clone(),
            receiver_id,
            conversation_id: message.conversation_id.clone(),
            text: message.text.clone(),
            message_id: None,
        });
        if let Err(e) = session.channel.emit(event) {
            tracing::info!(
                local_id = message.local_id,
                err = %e,
                "live notification dropped; relying on persisted copy"
            );
        }
    }
}

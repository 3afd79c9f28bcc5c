use std::time::Instant;

use super::unread::RemoteDisposition;
use super::AppCore;
use crate::channel::{LiveMessage, TypingSignal};
use crate::state::now_millis;
use crate::updates::{CoreMsg, InternalEvent};

impl AppCore {
    pub(super) fn on_live_message(&mut self, message: LiveMessage) {
        let Some(me) = self.my_user_id() else {
            return;
        };
        if message.sender_id == me {
            // Echo of our own send from another device or the relay.
            tracing::debug!(chat_id = %message.conversation_id, "ignoring own live message");
            return;
        }

        let active = self.active_chat_id().map(ToString::to_string);
        match self
            .unread
            .on_remote(&message.conversation_id, active.as_deref())
        {
            RemoteDisposition::MarkRead => {
                // Read state follows every partner message in the open chat,
                // duplicates included.
                self.spawn_mark_read(message.conversation_id.clone());
                let from_partner = self.active_partner_id() == Some(message.sender_id.as_str());
                if !from_partner {
                    tracing::debug!(chat_id = %message.conversation_id, "live message from non-partner");
                    return;
                }
                if self.store.append_remote(&message, now_millis()).is_some() {
                    self.emit_chat();
                }
            }
            RemoteDisposition::MarkedUnread { newly } => {
                tracing::debug!(chat_id = %message.conversation_id, newly, "message for inactive chat");
                if newly {
                    self.emit_chat();
                }
            }
        }
    }

    pub(super) fn on_live_typing(&mut self, signal: TypingSignal) {
        let Some(partner) = self.active_partner_id() else {
            return;
        };
        if signal.sender_id != partner || Some(signal.receiver_id.as_str()) != self.my_user_id() {
            return;
        }

        let was_typing = self.typing.is_typing();
        let now = Instant::now();
        let generation = self.typing.signal(&signal.sender_id, now);
        if let Some(state) = self.typing.state() {
            tracing::debug!(
                peer = %state.peer_id,
                generation,
                window_ms = state.expires_at.saturating_duration_since(now).as_millis() as u64,
                "partner typing"
            );
        }
        self.arm_typing_timer(generation);
        if !was_typing {
            self.emit_chat();
        }
    }

    fn arm_typing_timer(&mut self, generation: u64) {
        if let Some(timer) = self.typing_timer.take() {
            timer.abort();
        }
        let tx = self.core_sender.clone();
        let timeout = self.typing.timeout();
        self.typing_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TypingExpired {
                generation,
            })));
        }));
    }
}

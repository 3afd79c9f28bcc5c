use std::collections::BTreeSet;

/// What the actor must do for a live message that passed sender filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RemoteDisposition {
    /// Conversation is the ActiveChat: keep the server's read state current.
    MarkRead,
    /// Conversation is elsewhere; it is (now) in the unread set.
    MarkedUnread { newly: bool },
}

#[derive(Debug, Default)]
pub(super) struct UnreadTracker {
    unread: BTreeSet<String>,
    muted: BTreeSet<String>,
}

impl UnreadTracker {
    pub(super) fn on_remote(&mut self, chat_id: &str, active: Option<&str>) -> RemoteDisposition {
        if active == Some(chat_id) {
            return RemoteDisposition::MarkRead;
        }
        let newly = self.unread.insert(chat_id.to_string());
        RemoteDisposition::MarkedUnread { newly }
    }

    /// ActiveChat moved to `chat_id`. Returns true when it was unread, in
    /// which case the caller issues exactly one mark-read call.
    pub(super) fn activate(&mut self, chat_id: &str) -> bool {
        self.unread.remove(chat_id)
    }

    pub(super) fn mark_read(&mut self, chat_id: &str) -> bool {
        self.unread.remove(chat_id)
    }

    #[cfg(test)]
    pub(super) fn is_unread(&self, chat_id: &str) -> bool {
        self.unread.contains(chat_id)
    }

    pub(super) fn mute(&mut self, chat_id: &str) -> bool {
        self.muted.insert(chat_id.to_string())
    }

    pub(super) fn unmute(&mut self, chat_id: &str) -> bool {
        self.muted.remove(chat_id)
    }

    /// Unread conversations that should show a badge.
    pub(super) fn badges(&self) -> Vec<String> {
        self.unread.difference(&self.muted).cloned().collect()
    }

    pub(super) fn muted(&self) -> Vec<String> {
        self.muted.iter().cloned().collect()
    }

    pub(super) fn clear(&mut self) {
        self.unread.clear();
        self.muted.clear();
    }
}

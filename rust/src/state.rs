#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub channel_connected: bool,
    pub current_chat: Option<ChatViewState>,
    /// Conversations with unread live messages, muted ones excluded.
    pub unread_chats: Vec<String>,
    pub muted_chats: Vec<String>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            channel_connected: false,
            current_chat: None,
            unread_chats: vec![],
            muted_chats: vec![],
            toast: None,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user_id: String },
}

/// The ActiveChat as the UI renders it.
#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatViewState {
    pub chat_id: String,
    pub partner_id: String,
    pub partner: Option<PartnerProfile>,
    /// True until the history fetch for this chat settles.
    pub is_loading: bool,
    pub messages: Vec<ChatMessage>,
    pub partner_typing: bool,
    pub draft: String,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct PartnerProfile {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub is_guest: bool,
}

impl PartnerProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Store-assigned handle, stable for the lifetime of the session.
    pub local_id: u64,
    /// Canonical id once the server has saved the message.
    pub server_id: Option<String>,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub conversation_id: String,
    pub text: String,
    /// Unix millis. Server time for history, send time for local messages,
    /// arrival time for live messages.
    pub created_at: i64,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

impl ChatMessage {
    pub fn persisted(&self) -> bool {
        matches!(self.delivery, MessageDeliveryState::Persisted)
    }

    pub fn failed(&self) -> bool {
        matches!(self.delivery, MessageDeliveryState::Failed { .. })
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    /// Optimistically shown, persistence in flight.
    Pending,
    Persisted,
    /// Persistence failed; the message stays visible until retried or discarded.
    Failed { reason: String },
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    StartSession {
        user_id: String,
        token: String,
    },
    EndSession,

    // ActiveChat
    OpenChat {
        chat_id: String,
        partner_id: String,
    },
    CloseChat,
    MarkChatRead {
        chat_id: String,
    },
    MuteChat {
        chat_id: String,
    },
    UnmuteChat {
        chat_id: String,
    },

    // Composer
    UpdateDraft {
        chat_id: String,
        text: String,
    },
    SendMessage {
        chat_id: String,
        content: String,
    },
    RetryMessage {
        chat_id: String,
        local_id: u64,
    },
    DiscardMessage {
        chat_id: String,
        local_id: u64,
    },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes tokens or message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::StartSession { .. } => "StartSession",
            AppAction::EndSession => "EndSession",

            // ActiveChat
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",
            AppAction::MarkChatRead { .. } => "MarkChatRead",
            AppAction::MuteChat { .. } => "MuteChat",
            AppAction::UnmuteChat { .. } => "UnmuteChat",

            // Composer
            AppAction::UpdateDraft { .. } => "UpdateDraft",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DiscardMessage { .. } => "DiscardMessage",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}

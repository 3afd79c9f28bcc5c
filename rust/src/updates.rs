use crate::backend::{MinimalProfile, StoredMessage};
use crate::channel::{LiveMessage, TypingSignal};
use crate::error::FetchError;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results and notifications re-entering the actor. `session` and `token`
/// fields let the actor drop anything issued for a session or chat that has
/// since been replaced.
#[derive(Debug)]
pub enum InternalEvent {
    // Live channel
    LiveMessageReceived {
        session: u64,
        message: LiveMessage,
    },
    LiveTyping {
        session: u64,
        signal: TypingSignal,
    },
    ChannelStatus {
        session: u64,
        connected: bool,
    },

    // Async results
    HistoryLoaded {
        chat_id: String,
        token: u64,
        result: Result<Vec<StoredMessage>, FetchError>,
    },
    PartnerProfileLoaded {
        chat_id: String,
        token: u64,
        result: Result<MinimalProfile, FetchError>,
    },
    PersistResult {
        session: u64,
        local_id: u64,
        result: Result<StoredMessage, FetchError>,
    },

    // Timers
    TypingExpired {
        generation: u64,
    },

    Toast(String),
}

//! Error types for the chat core.
//!
//! None of these escape the app actor: fetch failures become a toast,
//! channel failures are logged and dropped, validation failures stop the
//! action before any network call.

use thiserror::Error;

/// Network/HTTP failure on history, persistence, read-state or profile calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The server rejected the bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// Non-success HTTP status.
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Short user-facing notice for a failed call. `context` is the
    /// operation-specific fallback message.
    pub fn notice(&self, context: &str) -> String {
        match self {
            FetchError::Unauthorized => "Session expired, please log in again".to_string(),
            _ => context.to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Live channel failures. Emits are best-effort, so callers only log these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("live channel unavailable")]
    Unavailable,
}

/// Outgoing-message input rejected before any network round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no conversation selected")]
    NoActiveChat,

    #[error("conversation {0} is not the active chat")]
    ChatMismatch(String),
}

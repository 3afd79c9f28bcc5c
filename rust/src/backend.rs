//! Persistence collaborator: message history, message saves, read state and
//! partner profiles over the REST API.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::SessionContext;
use crate::error::FetchError;

/// A message as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    pub conversation_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Body of the persist call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub text: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, FetchError>;
    async fn post_message(&self, message: &OutgoingMessage) -> Result<StoredMessage, FetchError>;
    async fn mark_read(&self, conversation_id: &str) -> Result<(), FetchError>;
    async fn mark_unread(&self, conversation_id: &str) -> Result<(), FetchError>;
    async fn fetch_profile(&self, user_id: &str) -> Result<MinimalProfile, FetchError>;
}

/// Builds the backend for one authenticated session.
pub trait ChatBackendConnector: Send + Sync + 'static {
    fn connect(&self, session: &SessionContext) -> Arc<dyn ChatBackend>;
}

pub type SharedBackendConnector = Arc<RwLock<Option<Arc<dyn ChatBackendConnector>>>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Wrapped { messages: Vec<StoredMessage> },
    Bare(Vec<StoredMessage>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedMessageResponse {
    saved_message: StoredMessage,
}

#[derive(Deserialize)]
struct UserResponse {
    user: MinimalProfile,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(err = %e, "http client builder failed; using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// `{base}/api/v1/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<url::Url, FetchError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| FetchError::Network(format!("invalid server url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| FetchError::Network("server url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn patch(&self, segments: &[&str]) -> Result<(), FetchError> {
        let resp = self
            .client
            .patch(self.url(segments)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, FetchError> {
        let resp = self
            .client
            .get(self.url(&["message", conversation_id])?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: HistoryResponse = Self::check(resp).await?.json().await?;
        Ok(match body {
            HistoryResponse::Wrapped { messages } => messages,
            HistoryResponse::Bare(messages) => messages,
        })
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<StoredMessage, FetchError> {
        let resp = self
            .client
            .post(self.url(&["message"])?)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await?;
        let body: SavedMessageResponse = Self::check(resp).await?.json().await?;
        Ok(body.saved_message)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), FetchError> {
        self.patch(&["message", conversation_id, "read"]).await
    }

    async fn mark_unread(&self, conversation_id: &str) -> Result<(), FetchError> {
        self.patch(&["message", conversation_id, "unread"]).await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<MinimalProfile, FetchError> {
        let resp = self
            .client
            .get(self.url(&["users", user_id])?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: UserResponse = Self::check(resp).await?.json().await?;
        Ok(body.user)
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackendConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpBackendConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl ChatBackendConnector for HttpBackendConnector {
    fn connect(&self, session: &SessionContext) -> Arc<dyn ChatBackend> {
        Arc::new(HttpBackend::new(
            self.base_url.clone(),
            session.token.clone(),
            self.timeout,
        ))
    }
}

/// Stand-in when networking is disabled and nothing was injected. Every call
/// fails without touching the network.
pub(crate) struct OfflineBackend;

impl OfflineBackend {
    fn offline<T>() -> Result<T, FetchError> {
        Err(FetchError::Network("network disabled".to_string()))
    }
}

#[async_trait]
impl ChatBackend for OfflineBackend {
    async fn fetch_history(&self, _conversation_id: &str) -> Result<Vec<StoredMessage>, FetchError> {
        Self::offline()
    }

    async fn post_message(&self, _message: &OutgoingMessage) -> Result<StoredMessage, FetchError> {
        Self::offline()
    }

    async fn mark_read(&self, _conversation_id: &str) -> Result<(), FetchError> {
        Self::offline()
    }

    async fn mark_unread(&self, _conversation_id: &str) -> Result<(), FetchError> {
        Self::offline()
    }

    async fn fetch_profile(&self, _user_id: &str) -> Result<MinimalProfile, FetchError> {
        Self::offline()
    }
}

//! REST persistence gateway.
//!
//! The gateway owns durable state: message history, chat directory rows and
//! unread counters. The realtime layer never writes anything the gateway has
//! not already accepted.

use crate::http::{HttpClient, HttpRequest};
use crate::types::chat::{Chat, ChatId, Message, MessageDraft, MessageId};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway returned HTTP {0}")]
    Status(u16),
    #[error("unexpected gateway response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Response envelope shared by every gateway endpoint.
///
/// Missing `data`/`message` keys decode as `None`; a `serde(default)` here
/// would force `T: Default` onto the derived `Deserialize` impl and break
/// the generic decode path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Unwraps the payload, turning a `success: false` body into an error.
    pub fn into_data(self) -> Result<T> {
        if !self.success {
            return Err(GatewayError::Rejected(
                self.message
                    .unwrap_or_else(|| "unspecified gateway failure".to_owned()),
            ));
        }
        self.data
            .ok_or_else(|| GatewayError::Rejected("gateway reported success without data".into()))
    }
}

/// Stored-record acknowledgement for a send. The gateway echoes the full
/// record; only the minted id matters to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessageData {
    pub id: MessageId,
}

/// Durable storage operations backing the sync layer.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Full ordered history of one chat.
    async fn get_messages(&self, chat: &ChatId) -> Result<Vec<Message>>;

    /// Stores a draft and returns the id the gateway assigned to it.
    async fn send_message(&self, draft: &MessageDraft) -> Result<MessageId>;

    /// Zeroes the unread counter and marks stored messages read; returns the
    /// updated directory row.
    async fn clear_chat_messages(&self, chat: &ChatId) -> Result<Chat>;
}

/// [`PersistenceGateway`] over the REST API.
pub struct HttpGateway {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpGateway {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        debug!("--> {} {}", request.method, request.url);
        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(GatewayError::Status(response.status_code));
        }
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&response.body)?;
        envelope.into_data()
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn get_messages(&self, chat: &ChatId) -> Result<Vec<Message>> {
        let url = self.endpoint(&format!(
            "/api/messages/{}",
            urlencoding::encode(chat.as_str())
        ));
        self.request_json(HttpRequest::get(url)).await
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<MessageId> {
        let url = self.endpoint("/api/messages");
        let body = serde_json::to_vec(draft)?;
        let request = HttpRequest::post(url)
            .with_header("Content-Type", "application/json")
            .with_body(body);
        let data: SentMessageData = self.request_json(request).await?;
        Ok(data.id)
    }

    async fn clear_chat_messages(&self, chat: &ChatId) -> Result<Chat> {
        let url = self.endpoint(&format!(
            "/api/chats/{}/clear-unread",
            urlencoding::encode(chat.as_str())
        ));
        self.request_json(HttpRequest::post(url)).await
    }
}

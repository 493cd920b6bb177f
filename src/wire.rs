//! Frame vocabulary spoken between clients and the relay.
//!
//! Every frame is a single JSON text message shaped as
//! `{"event": "<name>", "data": {...}}`. Client frames carry the full
//! `members` pair so the relay can route without holding any chat state.

use crate::types::chat::{ChatId, Message, UserId};
use serde::{Deserialize, Serialize};

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Binds this connection to a user id. Must be the first frame.
    Join(JoinPayload),
    SendMessage(SendMessagePayload),
    ClearUnreadMessages(ClearUnreadPayload),
    Typing(TypingPayload),
}

/// Frames the relay fans out to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerFrame {
    ReceiveMessage(Message),
    UnreadMessagesCleared(UnreadClearedPayload),
    StartedTyping(StartedTypingPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub user: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    #[serde(flatten)]
    pub message: Message,
    pub members: [UserId; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearUnreadPayload {
    pub chat: ChatId,
    pub members: [UserId; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub chat: ChatId,
    pub members: [UserId; 2],
    pub sender: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadClearedPayload {
    pub chat: ChatId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedTypingPayload {
    pub chat: ChatId,
    pub sender: UserId,
}

impl ClientFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl ServerFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

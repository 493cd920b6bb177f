// Domain types live together; events (with EventBus) carry the runtime side.
pub mod types {
    pub mod chat;
    pub mod events;
}

pub mod channel;
pub mod client;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod http;
pub mod relay;
pub mod send;
pub mod transport;
pub mod typing;
pub mod wire;

// Shared mocks and fixtures for the unit and integration suites.
pub mod test_utils;

pub use channel::RealtimeChannel;
pub use client::{ChatClient, ClientError};
pub use conversation::{ConversationView, ViewState};
pub use types::chat::{Chat, ChatId, Message, MessageDraft, MessageId, UserId};
pub use types::events::EventBus;

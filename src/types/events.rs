use crate::types::chat::{Chat, ChatId, Message, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Fired once the realtime channel is up and the session has been announced
/// to the relay.
#[derive(Debug, Clone)]
pub struct Connected;

/// Fired when the realtime channel goes away, deliberately or because the
/// underlying socket dropped.
#[derive(Debug, Clone)]
pub struct Disconnected;

/// A peer cleared its unread state for `chat`; everything we sent there has
/// now been seen.
#[derive(Debug, Clone)]
pub struct UnreadCleared {
    pub chat: ChatId,
}

/// A peer produced input activity in `chat`.
#[derive(Debug, Clone)]
pub struct TypingStarted {
    pub chat: ChatId,
    pub sender: UserId,
}

/// The chat directory was replaced wholesale, e.g. after an unread reset.
#[derive(Debug, Clone)]
pub struct ChatsUpdated {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient user-facing notification. Failures never interrupt a session;
/// they surface here and the flow moves on.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        /// Sends with no live receivers are dropped, never treated as errors.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),

    // Conversation events
    (message, Arc<Message>),
    (unread_cleared, Arc<UnreadCleared>),
    (typing, Arc<TypingStarted>),

    // Directory and UI-facing events
    (chats_updated, Arc<ChatsUpdated>),
    (notice, Arc<Notice>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//! Shared mocks and fixtures for the unit and integration suites.

use crate::channel::RealtimeChannel;
use crate::client::ChatClient;
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::types::chat::{Chat, ChatId, Message, MessageDraft, MessageId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub use crate::transport::mock::{MockTransportFactory, MockTransportHandle, pair as mock_transport};

/// Gateway backed by hash maps, mimicking the REST server's observable
/// behavior: ids are minted on store, the chat row tracks the last message
/// and one unread counter, and a clear resets both sides of that.
#[derive(Default)]
pub struct MemoryGateway {
    messages: Mutex<HashMap<ChatId, Vec<Message>>>,
    chats: Mutex<HashMap<ChatId, Chat>>,
    clear_calls: Mutex<HashMap<ChatId, usize>>,
    failing: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_chat(&self, chat: Chat) {
        self.chats.lock().unwrap().insert(chat.id.clone(), chat);
    }

    pub fn seed_messages(&self, chat: &ChatId, messages: Vec<Message>) {
        self.messages.lock().unwrap().insert(chat.clone(), messages);
    }

    /// When set, every operation fails the way a `success: false` body does.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored_messages(&self, chat: &ChatId) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(chat)
            .cloned()
            .unwrap_or_default()
    }

    pub fn chat_row(&self, chat: &ChatId) -> Option<Chat> {
        self.chats.lock().unwrap().get(chat).cloned()
    }

    pub fn clear_call_count(&self, chat: &ChatId) -> usize {
        self.clear_calls
            .lock()
            .unwrap()
            .get(chat)
            .copied()
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("simulated gateway failure".into()));
        }
        Ok(())
    }

    fn mint_id() -> MessageId {
        let mut bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut bytes);
        MessageId::new(hex::encode(bytes))
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get_messages(&self, chat: &ChatId) -> Result<Vec<Message>, GatewayError> {
        self.check_available()?;
        Ok(self.stored_messages(chat))
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<MessageId, GatewayError> {
        self.check_available()?;
        let id = Self::mint_id();
        let mut record = Message::from_draft(draft.clone(), id.clone());
        record.created_at = Some(Utc::now());

        self.messages
            .lock()
            .unwrap()
            .entry(draft.chat.clone())
            .or_default()
            .push(record.clone());

        if let Some(row) = self.chats.lock().unwrap().get_mut(&draft.chat) {
            row.unread_messages += 1;
            row.last_message = Some(record);
            row.updated_at = Utc::now();
        }
        Ok(id)
    }

    async fn clear_chat_messages(&self, chat: &ChatId) -> Result<Chat, GatewayError> {
        self.check_available()?;
        *self
            .clear_calls
            .lock()
            .unwrap()
            .entry(chat.clone())
            .or_insert(0) += 1;

        if let Some(messages) = self.messages.lock().unwrap().get_mut(chat) {
            for message in messages.iter_mut() {
                message.read = true;
            }
        }

        let mut chats = self.chats.lock().unwrap();
        let row = chats
            .get_mut(chat)
            .ok_or_else(|| GatewayError::Rejected("chat not found".into()))?;
        row.unread_messages = 0;
        if let Some(last) = row.last_message.as_mut() {
            last.read = true;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

/// Fresh two-party chat row with zeroed counters.
pub fn two_member_chat(id: &str, a: &str, b: &str) -> Chat {
    let now = Utc::now();
    Chat {
        id: ChatId::from(id),
        members: [UserId::from(a), UserId::from(b)],
        last_message: None,
        unread_messages: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Stored text message, already dated by the gateway.
pub fn text_message(id: &str, chat: &str, sender: &str, text: &str) -> Message {
    Message {
        id: MessageId::from(id),
        chat: ChatId::from(chat),
        sender: UserId::from(sender),
        text: text.to_owned(),
        image: None,
        created_at: Some(Utc::now()),
        read: false,
    }
}

/// Connected client over a mock transport and an empty in-memory gateway.
pub async fn create_test_client(
    user: &str,
) -> (Arc<ChatClient>, MockTransportHandle, Arc<MemoryGateway>) {
    let (factory, handle) = mock_transport();
    let channel = RealtimeChannel::new(UserId::from(user), Arc::new(factory));
    let gateway = Arc::new(MemoryGateway::new());
    let client = ChatClient::new(channel, gateway.clone());
    client
        .connect()
        .await
        .expect("mock transport should connect");
    (client, handle, gateway)
}

//! Client runtime: identity, realtime channel, gateway handle and the chat
//! directory. Conversation state lives in [`ConversationView`], not here.

use crate::channel::{ChannelError, RealtimeChannel};
use crate::config::AppConfig;
use crate::conversation::ConversationView;
use crate::gateway::{GatewayError, HttpGateway, PersistenceGateway};
use crate::http::UreqHttpClient;
use crate::transport::WebSocketTransportFactory;
use crate::types::chat::{Chat, ChatId, UserId};
use crate::types::events::{ChatsUpdated, EventBus, Notice};
use log::warn;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("no conversation is selected")]
    NoSelection,
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct ChatClient {
    user: UserId,
    channel: Arc<RealtimeChannel>,
    gateway: Arc<dyn PersistenceGateway>,
    chats: RwLock<Vec<Chat>>,
}

impl ChatClient {
    pub fn new(channel: Arc<RealtimeChannel>, gateway: Arc<dyn PersistenceGateway>) -> Arc<Self> {
        Arc::new(Self {
            user: channel.user().clone(),
            channel,
            gateway,
            chats: RwLock::new(Vec::new()),
        })
    }

    /// Composition root for the standard stack: WebSocket relay transport
    /// plus the REST gateway over ureq.
    pub fn from_config(config: &AppConfig) -> Arc<Self> {
        let factory = Arc::new(WebSocketTransportFactory::new(config.relay_url.clone()));
        let channel = RealtimeChannel::new(UserId::new(config.user.clone()), factory);
        let gateway = Arc::new(HttpGateway::new(
            Arc::new(UreqHttpClient::new()),
            config.gateway_url.clone(),
        ));
        Self::new(channel, gateway)
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn channel(&self) -> &Arc<RealtimeChannel> {
        &self.channel
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    pub fn bus(&self) -> &EventBus {
        self.channel.bus()
    }

    pub async fn connect(&self) -> Result<()> {
        self.channel.connect().await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.channel.disconnect().await;
    }

    /// Opens a conversation surface bound to this client.
    pub fn view(self: &Arc<Self>) -> ConversationView {
        ConversationView::new(self.clone())
    }

    pub async fn chats(&self) -> Vec<Chat> {
        self.chats.read().await.clone()
    }

    pub async fn chat(&self, id: &ChatId) -> Option<Chat> {
        self.chats.read().await.iter().find(|c| &c.id == id).cloned()
    }

    /// Replaces the whole directory, e.g. from an initial fetch.
    pub async fn set_chats(&self, chats: Vec<Chat>) {
        *self.chats.write().await = chats;
        self.publish_chats().await;
    }

    /// Swaps in an updated directory row returned by the gateway.
    pub(crate) async fn replace_chat(&self, updated: Chat) {
        {
            let mut chats = self.chats.write().await;
            if let Some(slot) = chats.iter_mut().find(|c| c.id == updated.id) {
                *slot = updated;
            } else {
                chats.push(updated);
            }
        }
        self.publish_chats().await;
    }

    /// Zeroes the unread counter of one directory row in place.
    pub(crate) async fn zero_unread(&self, chat: &ChatId) {
        {
            let mut chats = self.chats.write().await;
            let Some(slot) = chats.iter_mut().find(|c| &c.id == chat) else {
                return;
            };
            slot.unread_messages = 0;
        }
        self.publish_chats().await;
    }

    async fn publish_chats(&self) {
        let chats = self.chats.read().await.clone();
        let _ = self
            .bus()
            .chats_updated
            .send(Arc::new(ChatsUpdated { chats }));
    }

    /// Converts a failure into a transient user-facing notice.
    pub(crate) fn notify_error(&self, text: impl Into<String>) {
        let notice = Notice::error(text);
        warn!(target: "Client", "{}", notice.text);
        let _ = self.bus().notice.send(Arc::new(notice));
    }
}

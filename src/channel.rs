//! Realtime channel: one WebSocket session against the relay.
//!
//! The channel owns the transport, announces the user with a join frame,
//! decodes inbound frames and republishes them on the [`EventBus`]. It keeps
//! no conversation state of its own.

use crate::transport::{Transport, TransportEvent, TransportFactory};
use crate::types::chat::{ChatId, Message, UserId};
use crate::types::events::{
    Connected, Disconnected, EventBus, TypingStarted, UnreadCleared,
};
use crate::wire::{
    ClearUnreadPayload, ClientFrame, JoinPayload, SendMessagePayload, ServerFrame, TypingPayload,
};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, mpsc};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("channel is already connected")]
    AlreadyConnected,
    #[error("transport failure: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

pub struct RealtimeChannel {
    user: UserId,
    bus: EventBus,
    transport_factory: Arc<dyn TransportFactory>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    is_connected: AtomicBool,
    shutdown_notifier: Notify,
}

impl RealtimeChannel {
    pub fn new(user: UserId, transport_factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        Arc::new(Self {
            user,
            bus: EventBus::new(),
            transport_factory,
            transport: Mutex::new(None),
            is_connected: AtomicBool::new(false),
            shutdown_notifier: Notify::new(),
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    /// Dials the relay, announces the user and starts the event pump.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.is_connected.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyConnected);
        }

        let (transport, events) = match self.transport_factory.create_transport().await {
            Ok(pair) => pair,
            Err(e) => {
                self.is_connected.store(false, Ordering::SeqCst);
                return Err(ChannelError::Transport(e));
            }
        };
        *self.transport.lock().await = Some(transport);

        tokio::spawn(self.clone().event_pump(events));

        // The relay routes nothing to us until it knows who we are.
        let join = ClientFrame::Join(JoinPayload {
            user: self.user.clone(),
        });
        if let Err(e) = self.send_frame(&join).await {
            warn!(target: "Channel", "Join announcement failed: {e}");
            self.disconnect().await;
            return Err(e);
        }

        Ok(())
    }

    /// Tears the session down and notifies subscribers.
    pub async fn disconnect(&self) {
        self.shutdown_notifier.notify_waiters();
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
        if self.is_connected.swap(false, Ordering::SeqCst) {
            let _ = self.bus.disconnected.send(Arc::new(Disconnected));
        }
    }

    pub(crate) async fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let transport = self
            .transport
            .lock()
            .await
            .clone()
            .ok_or(ChannelError::NotConnected)?;
        let encoded = frame.encode()?;
        transport.send_frame(&encoded).await?;
        Ok(())
    }

    /// Broadcasts a gateway-confirmed message to the other chat member.
    pub async fn emit_message(&self, message: &Message, members: &[UserId; 2]) -> Result<()> {
        self.send_frame(&ClientFrame::SendMessage(SendMessagePayload {
            message: message.clone(),
            members: members.clone(),
        }))
        .await
    }

    /// Tells the peer their messages in `chat` have been seen.
    pub async fn emit_clear_unread(&self, chat: &ChatId, members: &[UserId; 2]) -> Result<()> {
        self.send_frame(&ClientFrame::ClearUnreadMessages(ClearUnreadPayload {
            chat: chat.clone(),
            members: members.clone(),
        }))
        .await
    }

    /// Announces input activity in `chat`.
    pub async fn emit_typing(&self, chat: &ChatId, members: &[UserId; 2]) -> Result<()> {
        self.send_frame(&ClientFrame::Typing(TypingPayload {
            chat: chat.clone(),
            members: members.clone(),
            sender: self.user.clone(),
        }))
        .await
    }

    async fn event_pump(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Channel", "Shutdown signaled, exiting event pump");
                    return;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        debug!(target: "Channel", "Transport connected as {}", self.user);
                        let _ = self.bus.connected.send(Arc::new(Connected));
                    }
                    Some(TransportEvent::FrameReceived(raw)) => self.handle_frame(&raw),
                    Some(TransportEvent::Disconnected) | None => {
                        debug!(target: "Channel", "Transport closed");
                        *self.transport.lock().await = None;
                        if self.is_connected.swap(false, Ordering::SeqCst) {
                            let _ = self.bus.disconnected.send(Arc::new(Disconnected));
                        }
                        return;
                    }
                },
            }
        }
    }

    fn handle_frame(&self, raw: &str) {
        let frame = match ServerFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(target: "Channel", "<-- Discarding undecodable frame: {e}");
                return;
            }
        };

        match frame {
            ServerFrame::ReceiveMessage(message) => {
                debug!(target: "Channel", "<-- Message {} in chat {}", message.id, message.chat);
                let _ = self.bus.message.send(Arc::new(message));
            }
            ServerFrame::UnreadMessagesCleared(payload) => {
                debug!(target: "Channel", "<-- Unread cleared in chat {}", payload.chat);
                let _ = self
                    .bus
                    .unread_cleared
                    .send(Arc::new(UnreadCleared { chat: payload.chat }));
            }
            ServerFrame::StartedTyping(payload) => {
                let _ = self.bus.typing.send(Arc::new(TypingStarted {
                    chat: payload.chat,
                    sender: payload.sender,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_transport;
    use crate::types::chat::MessageId;

    #[tokio::test]
    async fn connect_announces_the_user_first() {
        let (factory, handle) = mock_transport();
        let channel = RealtimeChannel::new(UserId::from("alice"), Arc::new(factory));
        channel.connect().await.unwrap();

        let frames = handle.sent_frames();
        assert_eq!(
            frames.first(),
            Some(&ClientFrame::Join(JoinPayload {
                user: UserId::from("alice"),
            }))
        );
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn double_connect_is_rejected() {
        let (factory, _handle) = mock_transport();
        let channel = RealtimeChannel::new(UserId::from("alice"), Arc::new(factory));
        channel.connect().await.unwrap();
        assert!(matches!(
            channel.connect().await,
            Err(ChannelError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn inbound_frames_are_republished_on_the_bus() {
        let (factory, handle) = mock_transport();
        let channel = RealtimeChannel::new(UserId::from("alice"), Arc::new(factory));
        let mut messages = channel.bus().message.subscribe();
        let mut typing = channel.bus().typing.subscribe();
        channel.connect().await.unwrap();

        handle
            .push_frame(&ServerFrame::ReceiveMessage(Message {
                id: MessageId::from("m1"),
                chat: ChatId::from("c1"),
                sender: UserId::from("bob"),
                text: "hello".to_owned(),
                image: None,
                created_at: None,
                read: false,
            }))
            .await;
        handle
            .push_frame(&ServerFrame::StartedTyping(crate::wire::StartedTypingPayload {
                chat: ChatId::from("c1"),
                sender: UserId::from("bob"),
            }))
            .await;

        let message = messages.recv().await.unwrap();
        assert_eq!(message.id.as_str(), "m1");
        let typing = typing.recv().await.unwrap();
        assert_eq!(typing.sender.as_str(), "bob");
    }

    #[tokio::test]
    async fn undecodable_frames_do_not_kill_the_pump() {
        let (factory, handle) = mock_transport();
        let channel = RealtimeChannel::new(UserId::from("alice"), Arc::new(factory));
        let mut typing = channel.bus().typing.subscribe();
        channel.connect().await.unwrap();

        handle.push_raw("garbage").await;
        handle
            .push_frame(&ServerFrame::StartedTyping(crate::wire::StartedTypingPayload {
                chat: ChatId::from("c1"),
                sender: UserId::from("bob"),
            }))
            .await;

        assert_eq!(typing.recv().await.unwrap().chat.as_str(), "c1");
    }

    #[tokio::test]
    async fn transport_loss_flips_state_and_notifies() {
        let (factory, handle) = mock_transport();
        let channel = RealtimeChannel::new(UserId::from("alice"), Arc::new(factory));
        let mut disconnected = channel.bus().disconnected.subscribe();
        channel.connect().await.unwrap();

        handle.drop_connection().await;

        disconnected.recv().await.unwrap();
        assert!(!channel.is_connected());
        assert!(matches!(
            channel
                .emit_typing(&ChatId::from("c1"), &[UserId::from("a"), UserId::from("b")])
                .await,
            Err(ChannelError::NotConnected)
        ));
    }
}

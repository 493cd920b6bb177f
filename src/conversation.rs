//! Per-conversation session surface.
//!
//! Selecting a chat tears down the previous session completely before the
//! next one starts: the old handler task is stopped and awaited, its bus
//! subscriptions dropped, and the view state rebuilt from scratch. Handlers
//! receive an explicit [`SessionContext`] naming the chat they serve, so a
//! late event can never leak into a newer selection.

use crate::client::ChatClient;
use crate::types::chat::{Chat, ChatId, Message, UserId};
use crate::types::events::{TypingStarted, UnreadCleared};
use crate::typing::{TypingDeadlines, TypingGate};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Everything the active conversation shows: history, composer input and the
/// peer's typing indicator. Rebuilt fresh on every selection.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub messages: Vec<Message>,
    pub recipient_typing: bool,
    pub draft: String,
    pub emoji_picker_open: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SelectedChat {
    pub(crate) chat: ChatId,
    pub(crate) members: [UserId; 2],
}

struct Session {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// The chat a handler task was built for, fixed at subscribe time.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) client: Arc<ChatClient>,
    pub(crate) chat: ChatId,
    pub(crate) members: [UserId; 2],
    pub(crate) state: Arc<RwLock<ViewState>>,
}

pub struct ConversationView {
    pub(crate) client: Arc<ChatClient>,
    pub(crate) state: Arc<RwLock<ViewState>>,
    pub(crate) selected: RwLock<Option<SelectedChat>>,
    pub(crate) typing_gate: Mutex<TypingGate>,
    session: Mutex<Option<Session>>,
}

impl ConversationView {
    pub(crate) fn new(client: Arc<ChatClient>) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(ViewState::default())),
            selected: RwLock::new(None),
            typing_gate: Mutex::new(TypingGate::new()),
            session: Mutex::new(None),
        }
    }

    /// Switches the view to `chat`.
    ///
    /// History and unread failures are reported as notices; the session keeps
    /// running either way so realtime traffic still flows.
    pub async fn select(&self, chat: &Chat) {
        // Previous handlers must be fully gone before new ones subscribe,
        // otherwise an event could be applied twice.
        self.stop_session().await;

        *self.state.write().await = ViewState::default();
        *self.selected.write().await = Some(SelectedChat {
            chat: chat.id.clone(),
            members: chat.members.clone(),
        });
        self.typing_gate.lock().await.reset();

        let ctx = SessionContext {
            client: self.client.clone(),
            chat: chat.id.clone(),
            members: chat.members.clone(),
            state: self.state.clone(),
        };

        match self.client.gateway().get_messages(&ctx.chat).await {
            Ok(messages) => {
                debug!(target: "Client/Session", "Loaded {} messages for chat {}", messages.len(), ctx.chat);
                self.state.write().await.messages = messages;
            }
            Err(e) => self
                .client
                .notify_error(format!("Failed to load messages: {e}")),
        }

        // Opening a chat acknowledges the peer's messages, unless the latest
        // one is our own and there is nothing of theirs to acknowledge.
        let own_last_message = chat
            .last_message
            .as_ref()
            .is_some_and(|m| &m.sender == self.client.user());
        if !own_last_message {
            ctx.clear_unread().await;
        }

        let bus = self.client.bus();
        let messages_rx = bus.message.subscribe();
        let cleared_rx = bus.unread_cleared.subscribe();
        let typing_rx = bus.typing.subscribe();

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_session(
            ctx,
            messages_rx,
            cleared_rx,
            typing_rx,
            shutdown.clone(),
        ));
        *self.session.lock().await = Some(Session { shutdown, handle });
    }

    /// Drops the active session without selecting anything else.
    pub async fn close(&self) {
        self.stop_session().await;
        *self.selected.write().await = None;
    }

    async fn stop_session(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            // notify_one stores a permit, so this also catches a task that
            // has not reached its first select yet.
            session.shutdown.notify_one();
            let _ = session.handle.await;
        }
    }

    /// Records composer input and announces typing activity, rate-limited.
    pub async fn input_changed(&self, text: impl Into<String>) {
        self.state.write().await.draft = text.into();

        let selected = self.selected.read().await.clone();
        let Some(selected) = selected else {
            return;
        };
        let due = self.typing_gate.lock().await.should_emit(Instant::now());
        if !due {
            return;
        }
        if let Err(e) = self
            .client
            .channel()
            .emit_typing(&selected.chat, &selected.members)
            .await
        {
            // Activity hints are best-effort; the draft itself is unaffected.
            debug!(target: "Client/Session", "Typing announcement failed: {e}");
        }
    }

    pub async fn set_emoji_picker_open(&self, open: bool) {
        self.state.write().await.emoji_picker_open = open;
    }

    pub async fn selected_chat(&self) -> Option<ChatId> {
        self.selected.read().await.as_ref().map(|s| s.chat.clone())
    }

    pub async fn snapshot(&self) -> ViewState {
        self.state.read().await.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn draft(&self) -> String {
        self.state.read().await.draft.clone()
    }

    pub async fn is_recipient_typing(&self) -> bool {
        self.state.read().await.recipient_typing
    }

    pub async fn emoji_picker_open(&self) -> bool {
        self.state.read().await.emoji_picker_open
    }
}

impl SessionContext {
    async fn handle_message(&self, message: &Message) {
        if message.chat != self.chat {
            return;
        }
        self.state.write().await.messages.push(message.clone());

        // The peer wrote while we are looking at the chat; acknowledge
        // immediately so their sent ticks update.
        if &message.sender != self.client.user() {
            self.clear_unread().await;
        }
    }

    async fn handle_unread_cleared(&self, event: &UnreadCleared) {
        if event.chat != self.chat {
            return;
        }
        self.client.zero_unread(&self.chat).await;
        let mut state = self.state.write().await;
        for message in &mut state.messages {
            message.read = true;
        }
    }

    async fn handle_typing(&self, event: &TypingStarted, deadlines: &mut TypingDeadlines) {
        if event.chat != self.chat || &event.sender == self.client.user() {
            return;
        }
        deadlines.record(event.sender.clone(), Instant::now());
        self.state.write().await.recipient_typing = true;
    }

    /// Acknowledges the peer's messages: announce over the channel, reset the
    /// gateway counter, then apply the returned directory row locally.
    pub(crate) async fn clear_unread(&self) {
        if let Err(e) = self
            .client
            .channel()
            .emit_clear_unread(&self.chat, &self.members)
            .await
        {
            debug!(target: "Client/Session", "Clear-unread announcement failed: {e}");
        }

        match self.client.gateway().clear_chat_messages(&self.chat).await {
            Ok(updated) => {
                self.client.replace_chat(updated).await;
                let mut state = self.state.write().await;
                for message in &mut state.messages {
                    message.read = true;
                }
            }
            Err(e) => self
                .client
                .notify_error(format!("Failed to clear unread messages: {e}")),
        }
    }
}

async fn run_session(
    ctx: SessionContext,
    mut messages_rx: tokio::sync::broadcast::Receiver<Arc<Message>>,
    mut cleared_rx: tokio::sync::broadcast::Receiver<Arc<UnreadCleared>>,
    mut typing_rx: tokio::sync::broadcast::Receiver<Arc<TypingStarted>>,
    shutdown: Arc<Notify>,
) {
    let mut deadlines = TypingDeadlines::new();

    loop {
        let next_expiry = deadlines.next_deadline();
        tokio::select! {
            _ = shutdown.notified() => {
                debug!(target: "Client/Session", "Session for chat {} shutting down", ctx.chat);
                return;
            }
            result = messages_rx.recv() => match result {
                Ok(message) => ctx.handle_message(&message).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "Client/Session", "Message stream lagged, {skipped} events dropped");
                }
                Err(RecvError::Closed) => return,
            },
            result = cleared_rx.recv() => match result {
                Ok(event) => ctx.handle_unread_cleared(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "Client/Session", "Unread stream lagged, {skipped} events dropped");
                }
                Err(RecvError::Closed) => return,
            },
            result = typing_rx.recv() => match result {
                Ok(event) => ctx.handle_typing(&event, &mut deadlines).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "Client/Session", "Typing stream lagged, {skipped} events dropped");
                }
                Err(RecvError::Closed) => return,
            },
            // The unwrap is safe: this arm is disabled when no deadline is armed.
            _ = async { sleep_until(next_expiry.unwrap()).await }, if next_expiry.is_some() => {
                let still_typing = deadlines.prune(Instant::now());
                ctx.state.write().await.recipient_typing = still_typing;
            }
        }
    }
}

//! Stateless fan-out relay.
//!
//! The relay keeps exactly one piece of state: which user id is reachable
//! over which connection. Frames carry their own routing (`members`), so
//! forwarding is a lookup plus a send, minus the originating connection.
//! Nothing is persisted and nothing is queued for offline members.

use crate::types::chat::UserId;
use crate::wire::{
    ClientFrame, SendMessagePayload, ServerFrame, StartedTypingPayload, UnreadClearedPayload,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Connected users, keyed by the id from their join frame. Values are
/// pre-encoded frame queues feeding each connection's writer task.
type Registry = DashMap<UserId, mpsc::UnboundedSender<String>>;

pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl RelayServer {
    /// Binds the listener; `127.0.0.1:0` picks a free port for tests.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            registry: Arc::new(Registry::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn run(self) -> std::io::Result<()> {
        info!(target: "Relay", "Listening on {}", self.listener.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let registry = self.registry.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, registry).await {
                    debug!(target: "Relay", "Connection {peer} ended with error: {e}");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
) -> Result<(), anyhow::Error> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // The connection is anonymous until its join frame arrives.
    let Some(first) = stream.next().await else {
        return Ok(());
    };
    let WsMessage::Text(text) = first? else {
        anyhow::bail!("expected a join frame, got a non-text message");
    };
    let ClientFrame::Join(join) = ClientFrame::decode(text.as_str())? else {
        anyhow::bail!("expected a join frame first");
    };
    let user = join.user;
    info!(target: "Relay", "{peer} joined as {user}");

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    registry.insert(user.clone(), frame_tx.clone());

    // Dropping the registry entry closes frame_rx, which ends the writer and
    // with it the connection. A reconnect replaces the entry, so only remove
    // it if it is still ours.
    let _guard = scopeguard::guard(
        (registry.clone(), user.clone(), frame_tx),
        |(registry, user, frame_tx)| {
            registry.remove_if(&user, |_, current| current.same_channel(&frame_tx));
        },
    );

    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message? {
            WsMessage::Text(text) => handle_client_frame(&registry, &user, text.as_str()),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    debug!(target: "Relay", "{user} ({peer}) disconnected");
    Ok(())
}

fn handle_client_frame(registry: &Registry, origin: &UserId, raw: &str) {
    let frame = match ClientFrame::decode(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(target: "Relay", "<-- Undecodable frame from {origin}: {e}");
            return;
        }
    };

    match frame {
        ClientFrame::Join(_) => {
            debug!(target: "Relay", "Duplicate join from {origin} ignored");
        }
        ClientFrame::SendMessage(payload) => {
            let SendMessagePayload { message, members } = payload;
            debug!(target: "Relay", "--> Message {} from {origin}", message.id);
            forward(
                registry,
                origin,
                &members,
                &ServerFrame::ReceiveMessage(message),
            );
        }
        ClientFrame::ClearUnreadMessages(payload) => forward(
            registry,
            origin,
            &payload.members,
            &ServerFrame::UnreadMessagesCleared(UnreadClearedPayload {
                chat: payload.chat.clone(),
            }),
        ),
        ClientFrame::Typing(payload) => forward(
            registry,
            origin,
            &payload.members,
            &ServerFrame::StartedTyping(StartedTypingPayload {
                chat: payload.chat.clone(),
                sender: payload.sender.clone(),
            }),
        ),
    }
}

/// Delivers `frame` to every chat member except the originating connection.
fn forward(registry: &Registry, origin: &UserId, members: &[UserId; 2], frame: &ServerFrame) {
    let encoded = match frame.encode() {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(target: "Relay", "Frame encoding failed: {e}");
            return;
        }
    };

    for member in members {
        if member == origin {
            continue;
        }
        match registry.get(member) {
            Some(entry) => {
                if entry.value().send(encoded.clone()).is_err() {
                    debug!(target: "Relay", "Writer for {member} is gone, dropping frame");
                }
            }
            None => debug!(target: "Relay", "{member} not connected, dropping frame"),
        }
    }
}

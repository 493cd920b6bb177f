//! Pluggable connection layer for the realtime channel.
//!
//! A [`Transport`] is one live connection to the relay; a
//! [`TransportFactory`] knows how to open one. The channel never touches
//! sockets directly, which keeps the sync logic testable against mocks.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// An event produced by the transport layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport has successfully connected.
    Connected,
    /// A text frame has been received from the relay.
    FrameReceived(String),
    /// The connection was lost.
    Disconnected,
}

/// Represents an active connection to the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one text frame to the relay.
    async fn send_frame(&self, frame: &str) -> Result<(), anyhow::Error>;

    /// Closes the connection.
    async fn disconnect(&self);
}

/// A factory responsible for creating new transport instances.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Creates a new transport and returns it, along with a stream of events.
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error>;
}

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, WsMessage>;
type WsStream = SplitStream<RawWs>;

const EVENT_CHANNEL_SIZE: usize = 100;

/// WebSocket transport speaking the relay's JSON text protocol.
pub struct WebSocketTransport {
    ws_sink: Arc<Mutex<Option<WsSink>>>,
    is_connected: Arc<Mutex<bool>>,
}

impl WebSocketTransport {
    fn new(sink: WsSink) -> Self {
        Self {
            ws_sink: Arc::new(Mutex::new(Some(sink))),
            is_connected: Arc::new(Mutex::new(true)),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_frame(&self, frame: &str) -> Result<(), anyhow::Error> {
        let mut sink_guard = self.ws_sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Socket is closed"))?;

        debug!("--> Sending frame: {} bytes", frame.len());
        sink.send(WsMessage::Text(frame.to_owned().into()))
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket send error: {}", e))?;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut is_connected = self.is_connected.lock().await;
        if *is_connected {
            *is_connected = false;
            *self.ws_sink.lock().await = None;
        }
    }
}

/// Factory that dials a relay URL (e.g. `ws://127.0.0.1:4880/`).
pub struct WebSocketTransportFactory {
    url: String,
}

impl WebSocketTransportFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        info!("Dialing {}", self.url);
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {}", e))?;

        let (sink, stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let transport = Arc::new(WebSocketTransport::new(sink));

        // Spawn read pump task
        let event_tx_clone = event_tx.clone();
        tokio::task::spawn(read_pump(stream, event_tx_clone));

        let _ = event_tx.send(TransportEvent::Connected).await;

        Ok((transport, event_rx))
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    loop {
        match stream.next().await {
            Some(Ok(msg)) => match msg {
                WsMessage::Text(text) => {
                    debug!("<-- Received frame: {} bytes", text.len());
                    if event_tx
                        .send(TransportEvent::FrameReceived(text.to_string()))
                        .await
                        .is_err()
                    {
                        warn!("Event receiver dropped, closing read pump");
                        break;
                    }
                }
                WsMessage::Close(_) => {
                    trace!("Received close frame");
                    break;
                }
                // Binary, ping and pong frames are not part of the protocol.
                _ => {}
            },
            Some(Err(e)) => {
                error!("Error reading from websocket: {e}");
                break;
            }
            None => {
                trace!("Websocket stream ended");
                break;
            }
        }
    }

    let _ = event_tx.send(TransportEvent::Disconnected).await;
}

/// In-process transport for tests: outgoing frames are captured, incoming
/// ones injected by hand.
pub mod mock {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub struct MockTransport {
        sent: Arc<StdMutex<Vec<String>>>,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_frame(&self, frame: &str) -> Result<(), anyhow::Error> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("mock transport send failure"));
            }
            self.sent.lock().unwrap().push(frame.to_owned());
            Ok(())
        }

        async fn disconnect(&self) {}
    }

    /// Test-side controls for one mock connection.
    #[derive(Clone)]
    pub struct MockTransportHandle {
        events: mpsc::Sender<TransportEvent>,
        sent: Arc<StdMutex<Vec<String>>>,
        failing: Arc<AtomicBool>,
    }

    impl MockTransportHandle {
        /// Injects a raw inbound frame, as if the relay had sent it.
        pub async fn push_raw(&self, raw: &str) {
            self.events
                .send(TransportEvent::FrameReceived(raw.to_owned()))
                .await
                .expect("mock event pump is gone");
        }

        /// Injects a typed relay frame.
        pub async fn push_frame(&self, frame: &crate::wire::ServerFrame) {
            let encoded = frame.encode().expect("server frame should encode");
            self.push_raw(&encoded).await;
        }

        /// Simulates the relay dropping the connection.
        pub async fn drop_connection(&self) {
            let _ = self.events.send(TransportEvent::Disconnected).await;
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Everything the client wrote, oldest first.
        pub fn sent_raw(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Decoded view of [`sent_raw`](Self::sent_raw).
        pub fn sent_frames(&self) -> Vec<crate::wire::ClientFrame> {
            self.sent_raw()
                .iter()
                .map(|raw| {
                    crate::wire::ClientFrame::decode(raw).expect("client frame should decode")
                })
                .collect()
        }

        pub fn clear_sent(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    /// Single-use factory: hands out the prepared transport on the first
    /// `create_transport` call.
    pub struct MockTransportFactory {
        prepared: StdMutex<Option<(Arc<MockTransport>, mpsc::Receiver<TransportEvent>)>>,
        events: mpsc::Sender<TransportEvent>,
    }

    /// Builds a connected factory/handle pair.
    pub fn pair() -> (MockTransportFactory, MockTransportHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let failing = Arc::new(AtomicBool::new(false));

        let transport = Arc::new(MockTransport {
            sent: sent.clone(),
            failing: failing.clone(),
        });
        let factory = MockTransportFactory {
            prepared: StdMutex::new(Some((transport, event_rx))),
            events: event_tx.clone(),
        };
        let handle = MockTransportHandle {
            events: event_tx,
            sent,
            failing,
        };
        (factory, handle)
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn create_transport(
            &self,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            let (transport, event_rx) = self
                .prepared
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("mock transport already taken"))?;
            let _ = self.events.send(TransportEvent::Connected).await;
            Ok((transport, event_rx))
        }
    }
}

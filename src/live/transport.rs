use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

use crate::error::SessionError;

/// Minimal message shape shared by the codec and the session.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
    /// Close frame from the peer, with its reason when present.
    Close(Option<String>),
}

/// Opens a fresh full-duplex channel to the provider.
///
/// The session calls this once on connect and again for every reconnect
/// attempt. Tests substitute an in-memory implementation.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
    ) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>), SessionError>;
}

/// Write half of a connection.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, message: WireMessage) -> Result<(), SessionError>;

    /// Graceful close handshake. Best-effort; callers log failures.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Read half of a connection. `None` means the channel ended.
#[async_trait]
pub trait MessageStream: Send {
    async fn next_message(&mut self) -> Option<Result<WireMessage, SessionError>>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket connector for the provider endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
    ) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>), SessionError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SessionError::Transport(format!("connect failed: {}", e)))?;

        info!("WebSocket connected");

        let (sink, stream) = ws_stream.split();

        Ok((
            Box::new(WsMessageSink { inner: sink }),
            Box::new(WsMessageStream { inner: stream }),
        ))
    }
}

struct WsMessageSink {
    inner: WsSink,
}

#[async_trait]
impl MessageSink for WsMessageSink {
    async fn send(&mut self, message: WireMessage) -> Result<(), SessionError> {
        let msg = match message {
            WireMessage::Text(text) => Message::Text(text.into()),
            WireMessage::Binary(data) => Message::Binary(data.into()),
            WireMessage::Close(_) => Message::Close(None),
        };

        self.inner
            .send(msg)
            .await
            .map_err(|e| SessionError::Transport(format!("send failed: {}", e)))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.inner
            .close()
            .await
            .map_err(|e| SessionError::Transport(format!("close failed: {}", e)))
    }
}

struct WsMessageStream {
    inner: WsStream,
}

#[async_trait]
impl MessageStream for WsMessageStream {
    async fn next_message(&mut self) -> Option<Result<WireMessage, SessionError>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text.to_string()))),
                Ok(Message::Binary(data)) => Some(Ok(WireMessage::Binary(data.into()))),
                Ok(Message::Close(frame)) => Some(Ok(WireMessage::Close(
                    frame.map(|f| f.reason.to_string()),
                ))),
                // Ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => Some(Err(SessionError::Transport(format!("receive failed: {}", e)))),
            };
        }
    }
}

//! The WebSocket implementation of the event stream transport.

use crate::ports::{
    EventConnection,
    EventTransport,
};
use anyhow::Context;
use futures::{
    SinkExt,
    StreamExt,
    stream::{
        SplitSink,
        SplitStream,
    },
};
use meeray_types::services::events::ControlMessage;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::protocol::Message,
};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The default endpoint of the event stream.
pub const DEFAULT_URL: &str = "ws://localhost:8080/kafka-events";

#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl EventTransport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(&self) -> anyhow::Result<Self::Connection> {
        tracing::debug!(url = %self.url, "Connecting to the event stream");
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        tracing::debug!(status = ?response.status(), "WebSocket handshake completed");

        let (sink, receiver) = stream.split();
        Ok(WebSocketConnection { sink, receiver })
    }
}

pub struct WebSocketConnection {
    sink: SplitSink<WsStream, Message>,
    receiver: SplitStream<WsStream>,
}

#[async_trait::async_trait]
impl EventConnection for WebSocketConnection {
    async fn send(&mut self, message: &ControlMessage) -> anyhow::Result<()> {
        let json = serde_json::to_string(message)?;
        tracing::debug!(%json, "Sending control message");
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> anyhow::Result<Option<String>> {
        loop {
            let Some(message) = self.receiver.next().await else {
                return Ok(None)
            };

            match message? {
                Message::Text(text) => return Ok(Some(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "WebSocket close frame received");
                    return Ok(None)
                }
                Message::Binary(data) => {
                    tracing::warn!(len = data.len(), "Ignoring a binary message");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    tracing::trace!("Ignoring a control frame");
                }
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

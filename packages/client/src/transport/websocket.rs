//! WebSocket transport backed by tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message},
};
use url::Url;

use super::{Connector, Transport};
use crate::error::TransportError;

/// Connector opening real WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| match e {
                WsError::Http(response) => TransportError::Rejected(response.status().as_u16()),
                other => TransportError::Connect(other.to_string()),
            })?;

        tracing::debug!(
            "WebSocket handshake with {} completed ({})",
            url.host_str().unwrap_or_default(),
            response.status()
        );

        Ok(Box::new(WebSocketTransport { stream }))
    }
}

/// An open WebSocket connection.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring binary frame ({} bytes)", data.len());
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!("Server closed the connection: {:?}", frame);
                    return None;
                }
                // Ping/pong is handled automatically by tungstenite
                Ok(_) => {}
                Err(WsError::ConnectionClosed) => return None,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Error while closing WebSocket: {}", e);
        }
    }
}

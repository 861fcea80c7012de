//! Physical connection seam.
//!
//! The socket session talks to the network only through [`Connector`] and [`Transport`].
//!
//! - `websocket`: tokio-tungstenite implementation

pub mod websocket;

use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;

pub use websocket::WebSocketConnector;

/// One open, bidirectional text channel.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer closed the channel.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the channel; errors are ignored.
    async fn close(&mut self);
}

/// Opens [`Transport`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError>;
}

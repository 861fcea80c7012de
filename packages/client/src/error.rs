//! Error types for the realtime client.

use thiserror::Error;

use crate::config::ConfigError;

/// Failure of a single physical connection.
///
/// These are transient: the session retries them according to its reconnect policy and
/// only reports them through logs and state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error("connection rejected with HTTP status {0}")]
    Rejected(u16),

    #[error("connection lost: {0}")]
    Io(String),

    #[error("connection closed by server")]
    Closed,
}

/// Raised once when the reconnect policy gives up on a room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gave up reconnecting to room '{room_id}' after {attempts} attempts")]
pub struct TerminalConnectionError {
    pub room_id: String,
    pub attempts: u32,
}

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Endpoint configuration could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A message was sent while the session was not connected
    #[error("not connected to a room")]
    NotConnected,

    #[error("room id must not be empty")]
    InvalidRoomId,

    #[error("message body must not be empty")]
    EmptyMessage,

    /// The deployment requires a token and none was given
    #[error("an auth token is required to join room '{0}'")]
    AuthTokenRequired(String),

    /// `retry` was called before any room was joined
    #[error("no previous room to reconnect to")]
    NothingToRetry,

    /// Connection attempt failed; retried silently
    #[error("transient connection error: {0}")]
    TransientConnection(#[from] TransportError),

    /// Reconnect attempts exhausted
    #[error(transparent)]
    TerminalConnection(#[from] TerminalConnectionError),

    #[error("failed to encode frame: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{MessagePushError, RepositoryError, ValueObjectError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRoomError {
    #[error("failed to encode frame: {0}")]
    Serialization(String),

    #[error("failed to deliver room snapshot: {0}")]
    SnapshotUndelivered(#[from] MessagePushError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaveRoomError {
    #[error("failed to encode frame: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostMessageError {
    #[error("message addressed to room '{actual}' on a connection to room '{expected}'")]
    RoomMismatch { expected: String, actual: String },

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] ValueObjectError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("failed to encode frame: {0}")]
    Serialization(String),

    #[error("failed to broadcast message: {0}")]
    BroadcastFailed(#[from] MessagePushError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GetRoomDetailError {
    #[error("invalid room id: {0}")]
    InvalidRoomId(#[from] ValueObjectError),

    #[error("room not found")]
    RoomNotFound,
}

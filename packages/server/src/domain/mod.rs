//! ドメイン層
//!
//! - `value_object`: RoomId, UserId, ConnectionId, MessageBody
//! - `model`: Room, Member, StoredMessage
//! - `repository`: RoomRepository trait
//! - `message_pusher`: MessagePusher trait
//! - `error`: ドメインエラー

pub mod error;
pub mod message_pusher;
pub mod model;
pub mod repository;
pub mod value_object;

pub use error::{MessagePushError, RepositoryError, ValueObjectError};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use model::{DEFAULT_HISTORY_LIMIT, JoinOutcome, Member, Room, StoredMessage};
pub use repository::RoomRepository;
pub use value_object::{ConnectionId, MessageBody, RoomId, UserId};

#[cfg(test)]
pub use message_pusher::MockMessagePusher;

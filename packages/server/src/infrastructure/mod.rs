//! Infrastructure 層
//!
//! - `repository`: RoomRepository のインメモリ実装
//! - `message_pusher`: MessagePusher の WebSocket 実装
//! - `dto`: ワイヤーフォーマット / HTTP レスポンスとドメインモデルの変換

pub mod dto;
pub mod message_pusher;
pub mod repository;

//! DTO とドメインモデルの変換
//!
//! WebSocket のフレームは `collab_shared::protocol` の型をそのまま使う。

pub mod conversion;
pub mod http;

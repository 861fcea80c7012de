//! UseCase 層
//!
//! - `join_room`: ルームへの参加
//! - `leave_room`: ルームからの退出
//! - `post_message`: チャットメッセージの投稿
//! - `get_room_detail`: ルーム詳細の取得

pub mod error;
pub mod get_room_detail;
pub mod join_room;
pub mod leave_room;
pub mod post_message;

pub use error::{GetRoomDetailError, JoinRoomError, LeaveRoomError, PostMessageError};
pub use get_room_detail::GetRoomDetailUseCase;
pub use join_room::{JoinRoomUseCase, JoinedRoom};
pub use leave_room::LeaveRoomUseCase;
pub use post_message::PostMessageUseCase;

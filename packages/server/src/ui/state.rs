//! Shared application state.

use std::sync::Arc;

use crate::usecase::{GetRoomDetailUseCase, JoinRoomUseCase, LeaveRoomUseCase, PostMessageUseCase};

pub struct AppState {
    pub join_room_usecase: Arc<JoinRoomUseCase>,
    pub leave_room_usecase: Arc<LeaveRoomUseCase>,
    pub post_message_usecase: Arc<PostMessageUseCase>,
    pub get_room_detail_usecase: Arc<GetRoomDetailUseCase>,
}

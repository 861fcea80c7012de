//! UseCase: ルーム詳細取得

use std::sync::Arc;

use crate::domain::{RepositoryError, Room, RoomId, RoomRepository};

use super::error::GetRoomDetailError;

pub struct GetRoomDetailUseCase {
    repository: Arc<dyn RoomRepository>,
}

impl GetRoomDetailUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, room_id: String) -> Result<Room, GetRoomDetailError> {
        let room_id = RoomId::new(room_id)?;
        self.repository
            .get_room(&room_id)
            .await
            .map_err(|e| match e {
                RepositoryError::RoomNotFound(_) | RepositoryError::NotAMember { .. } => {
                    GetRoomDetailError::RoomNotFound
                }
            })
    }
}

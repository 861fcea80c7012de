//! InMemory Room Repository 実装
//!
//! ルーム ID をキーとした HashMap をインメモリ DB として使用する。
//! 最後のメンバーが退出したルームは破棄する。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use collab_shared::protocol::CodeReference;

use crate::domain::{
    ConnectionId, DEFAULT_HISTORY_LIMIT, JoinOutcome, Member, MessageBody, RepositoryError, Room,
    RoomId, RoomRepository, StoredMessage, UserId,
};

pub struct InMemoryRoomRepository {
    rooms: Mutex<HashMap<RoomId, Room>>,
    /// 新規ルームに設定する履歴の上限
    history_limit: usize,
}

impl InMemoryRoomRepository {
    pub fn new(history_limit: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            history_limit,
        }
    }
}

impl Default for InMemoryRoomRepository {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn join(&self, room_id: RoomId, member: Member, now: i64) -> JoinOutcome {
        let mut rooms = self.rooms.lock().await;
        let history_limit = self.history_limit;
        let room = rooms.entry(room_id.clone()).or_insert_with(|| {
            tracing::info!("Room '{}' created", room_id);
            Room::with_history_limit(room_id, now, history_limit)
        });
        room.join(member)
    }

    async fn leave(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Option<Vec<Member>> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.get_mut(room_id)?;
        if !room.leave(user_id, connection_id) {
            return None;
        }

        let remaining = room.members().to_vec();
        if remaining.is_empty() {
            rooms.remove(room_id);
            tracing::info!("Room '{}' is empty and was dropped", room_id);
        }
        Some(remaining)
    }

    async fn post_message(
        &self,
        room_id: &RoomId,
        author_id: UserId,
        body: MessageBody,
        code_reference: Option<CodeReference>,
        client_temp_id: Option<String>,
        timestamp: i64,
    ) -> Result<(StoredMessage, Vec<Member>), RepositoryError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| RepositoryError::RoomNotFound(room_id.to_string()))?;
        if room.member(&author_id).is_none() {
            return Err(RepositoryError::NotAMember {
                room_id: room_id.to_string(),
                user_id: author_id.to_string(),
            });
        }

        let message = room.post(author_id, body, code_reference, client_temp_id, timestamp);
        Ok((message, room.members().to_vec()))
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Room, RepositoryError> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| RepositoryError::RoomNotFound(room_id.to_string()))
    }

    async fn count_rooms(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

//! UseCase: ルーム退出処理
//!
//! ### どのような状況を想定しているか
//! - 正常系：退出と残りのメンバーへの PARTICIPANT_LEFT 通知
//! - エッジケース：同じユーザーの他の接続が残っている場合（通知しない）
//! - エッジケース：既に取り除かれた接続の切断（何も起きない）
//! - エッジケース：最後のメンバーの退出（通知先なし）

use std::sync::Arc;

use collab_shared::protocol::ServerFrame;

use crate::domain::{ConnectionId, MessagePusher, RoomId, RoomRepository, UserId};

use super::error::LeaveRoomError;

/// ルーム退出のユースケース
pub struct LeaveRoomUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl LeaveRoomUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// 接続の終了を処理する
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - ユーザーがルームから退出した（最後の接続が閉じた）
    /// * `Ok(false)` - 同じユーザーの他の接続が残っている、または既に取り除かれていた
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Result<bool, LeaveRoomError> {
        self.message_pusher.unregister(connection_id).await;

        let Some(remaining) = self
            .repository
            .leave(room_id, user_id, connection_id)
            .await
        else {
            tracing::debug!(
                "Stale connection '{}' of '{}' closed, nothing to do",
                connection_id,
                user_id
            );
            return Ok(false);
        };

        if remaining.iter().any(|m| m.id == *user_id) {
            tracing::debug!(
                "Connection '{}' of '{}' closed, other connections remain",
                connection_id,
                user_id
            );
            return Ok(false);
        }
        if remaining.is_empty() {
            return Ok(true);
        }

        let left = ServerFrame::ParticipantLeft {
            room_id: room_id.as_str().to_string(),
            participant_id: user_id.as_str().to_string(),
        };
        let left_json = serde_json::to_string(&left)
            .map_err(|e| LeaveRoomError::Serialization(e.to_string()))?;
        let targets = remaining.iter().map(|m| m.connection_id).collect();
        if let Err(e) = self.message_pusher.broadcast(targets, &left_json).await {
            tracing::warn!("Failed to broadcast participant-left: {}", e);
        }

        Ok(true)
    }
}

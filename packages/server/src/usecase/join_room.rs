//! UseCase: ルーム参加処理
//!
//! ### 何をテストしているか
//! - JoinRoomUseCase::execute()
//! - 参加者への ROOM_SNAPSHOT 送信と、他の参加者への PARTICIPANT_JOINED 通知
//!
//! ### どのような状況を想定しているか
//! - 正常系：空のルームへの参加、既存メンバーがいるルームへの参加
//! - エッジケース：同じユーザーの二つ目の接続（既存の接続は残り、参加通知は送らない）

use std::sync::Arc;

use collab_shared::{
    protocol::{ParticipantInfo, ServerFrame},
    time::Clock,
};

use crate::domain::{
    ConnectionId, Member, MessagePusher, PusherChannel, RoomId, RoomRepository, UserId,
};

use super::error::JoinRoomError;

/// 参加に成功した接続
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub room_id: RoomId,
    pub member: Member,
}

/// ルーム参加のユースケース
pub struct JoinRoomUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl JoinRoomUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
            clock,
        }
    }

    /// ルーム参加を実行
    ///
    /// # Arguments
    ///
    /// * `room_id` - 参加するルーム
    /// * `user_id` - 参加するユーザー
    /// * `display_name` - 表示名（空ならユーザー ID）
    /// * `sender` - この接続へのメッセージ送信用チャンネル
    ///
    /// # Returns
    ///
    /// * `Ok(JoinedRoom)` - 参加成功。`member.connection_id` が退出時に必要
    /// * `Err(JoinRoomError)` - スナップショットを送れなかった
    pub async fn execute(
        &self,
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        sender: PusherChannel,
    ) -> Result<JoinedRoom, JoinRoomError> {
        let now = self.clock.now_millis();
        let connection_id = ConnectionId::generate();
        let member = Member::new(user_id, display_name, connection_id, now);

        // 1. 送信チャンネルを登録してからメンバーに加える
        self.message_pusher.register(connection_id, sender).await;
        let outcome = self
            .repository
            .join(room_id.clone(), member.clone(), now)
            .await;

        // 2. 参加者にスナップショットを送る
        let snapshot = ServerFrame::RoomSnapshot {
            room_id: room_id.as_str().to_string(),
            participants: outcome
                .participants
                .iter()
                .map(ParticipantInfo::from)
                .collect(),
        };
        let snapshot_json = encode(&snapshot)?;
        if let Err(e) = self.message_pusher.push_to(connection_id, &snapshot_json).await {
            self.repository
                .leave(&room_id, &member.id, connection_id)
                .await;
            self.message_pusher.unregister(connection_id).await;
            return Err(e.into());
        }

        // 3. 他の参加者に通知する（そのユーザーの最初の接続のときだけ）
        if !outcome.first_connection {
            tracing::info!(
                "User '{}' opened another connection to room '{}'",
                member.id,
                room_id
            );
            return Ok(JoinedRoom { room_id, member });
        }
        let joined = ServerFrame::ParticipantJoined {
            room_id: room_id.as_str().to_string(),
            participant: ParticipantInfo::from(&member),
        };
        let joined_json = encode(&joined)?;
        let targets: Vec<ConnectionId> = outcome
            .members
            .iter()
            .filter(|m| m.id != member.id)
            .map(|m| m.connection_id)
            .collect();
        if let Err(e) = self.message_pusher.broadcast(targets, &joined_json).await {
            tracing::warn!("Failed to broadcast participant-joined: {}", e);
        }

        Ok(JoinedRoom { room_id, member })
    }
}

fn encode(frame: &ServerFrame) -> Result<String, JoinRoomError> {
    serde_json::to_string(frame).map_err(|e| JoinRoomError::Serialization(e.to_string()))
}

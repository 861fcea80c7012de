//! UseCase: チャットメッセージ投稿処理
//!
//! 投稿はルーム内で採番され、投稿者を含む全メンバーに CHAT として配信される。
//! 投稿者へのエコーが送信確認（ack）を兼ねる。

use std::sync::Arc;

use collab_shared::{
    protocol::{ClientFrame, ServerFrame},
    time::Clock,
};

use crate::domain::{
    ConnectionId, MessageBody, MessagePusher, RoomId, RoomRepository, StoredMessage, UserId,
};

use super::error::PostMessageError;

/// メッセージ投稿のユースケース
pub struct PostMessageUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl PostMessageUseCase {
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

    /// クライアントから届いたフレームを処理する
    ///
    /// # Arguments
    ///
    /// * `room_id` - 接続が参加しているルーム
    /// * `author_id` - 接続のユーザー
    /// * `frame` - 受信したフレーム
    ///
    /// # Returns
    ///
    /// * `Ok(StoredMessage)` - 採番・配信済みのメッセージ
    /// * `Err(PostMessageError)` - 宛先ルームの不一致、不正な本文など
    pub async fn execute(
        &self,
        room_id: &RoomId,
        author_id: UserId,
        frame: ClientFrame,
    ) -> Result<StoredMessage, PostMessageError> {
        let ClientFrame::Chat {
            repository_id,
            message,
            code_reference,
            client_temp_id,
        } = frame;

        if repository_id != room_id.as_str() {
            return Err(PostMessageError::RoomMismatch {
                expected: room_id.as_str().to_string(),
                actual: repository_id,
            });
        }
        let body = MessageBody::new(message)?;

        let (stored, members) = self
            .repository
            .post_message(
                room_id,
                author_id,
                body,
                code_reference,
                client_temp_id,
                self.clock.now_millis(),
            )
            .await?;

        let chat_json = serde_json::to_string(&ServerFrame::from(stored.clone()))
            .map_err(|e| PostMessageError::Serialization(e.to_string()))?;
        let targets = members.iter().map(|m| m.connection_id).collect();
        self.message_pusher.broadcast(targets, &chat_json).await?;

        tracing::debug!(
            "Message #{} from '{}' delivered to {} members of '{}'",
            stored.sequence_id,
            stored.author_id,
            members.len(),
            room_id
        );
        Ok(stored)
    }

    /// 不正なフレームを送ってきた接続に ERROR を返す
    pub async fn reject(&self, connection_id: ConnectionId, reason: &str) {
        let frame = ServerFrame::Error {
            message: reason.to_string(),
        };
        let Ok(json) = serde_json::to_string(&frame) else {
            return;
        };
        if let Err(e) = self.message_pusher.push_to(connection_id, &json).await {
            tracing::debug!("Could not report error to '{}': {}", connection_id, e);
        }
    }
}

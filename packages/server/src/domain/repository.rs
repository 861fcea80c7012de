//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェース。
//! 具体的な実装は Infrastructure 層が提供する（依存性の逆転）。

use async_trait::async_trait;

use collab_shared::protocol::CodeReference;

use super::{
    ConnectionId, JoinOutcome, Member, MessageBody, RepositoryError, Room, RoomId,
    StoredMessage, UserId,
};

/// Room Repository trait
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// ルームに接続を追加する。ルームが無ければ作成する。
    async fn join(&self, room_id: RoomId, member: Member, now: i64) -> JoinOutcome;

    /// 接続をルームから取り除く
    ///
    /// # Returns
    ///
    /// * `Some(remaining)` - 取り除いた。残りの全接続
    /// * `None` - 既に取り除かれた接続、または存在しないルーム
    async fn leave(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Option<Vec<Member>>;

    /// メッセージを採番して保存し、配信先のメンバー一覧と共に返す
    async fn post_message(
        &self,
        room_id: &RoomId,
        author_id: UserId,
        body: MessageBody,
        code_reference: Option<CodeReference>,
        client_temp_id: Option<String>,
        timestamp: i64,
    ) -> Result<(StoredMessage, Vec<Member>), RepositoryError>;

    /// Room エンティティを取得
    async fn get_room(&self, room_id: &RoomId) -> Result<Room, RepositoryError>;

    /// 存在するルームの数
    async fn count_rooms(&self) -> usize;
}

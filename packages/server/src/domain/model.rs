//! ドメインモデル: Room, Member, StoredMessage

use std::collections::VecDeque;

use collab_shared::protocol::CodeReference;

use super::value_object::{ConnectionId, MessageBody, RoomId, UserId};

/// ルームごとに保持するメッセージ履歴の既定上限
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// ルームへの接続 1 本分の参加者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub display_name: String,
    /// このメンバーを保持している接続
    pub connection_id: ConnectionId,
    pub joined_at: i64,
}

impl Member {
    pub fn new(
        id: UserId,
        display_name: impl Into<String>,
        connection_id: ConnectionId,
        joined_at: i64,
    ) -> Self {
        let display_name = display_name.into();
        let display_name = if display_name.trim().is_empty() {
            id.as_str().to_string()
        } else {
            display_name
        };
        Self {
            id,
            display_name,
            connection_id,
            joined_at,
        }
    }
}

/// サーバーが採番したチャットメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// ルーム内で単調増加する番号（1 始まり）
    pub sequence_id: u64,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub body: MessageBody,
    pub code_reference: Option<CodeReference>,
    pub timestamp: i64,
    pub client_temp_id: Option<String>,
}

/// `Room::join` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// このユーザーにとってルーム内で最初の接続か
    pub first_connection: bool,
    /// 参加後の全接続（ユーザー ID 順、同じユーザー内では参加順）
    pub members: Vec<Member>,
    /// 参加後のユーザー一覧（ユーザーごとに最初の接続）
    pub participants: Vec<Member>,
}

/// チャットルーム
///
/// メンバーは接続単位で保持する。同じユーザーが複数のタブから参加できる。
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub created_at: i64,
    members: Vec<Member>,
    history: VecDeque<StoredMessage>,
    history_limit: usize,
    last_sequence: u64,
}

impl Room {
    pub fn new(id: RoomId, created_at: i64) -> Self {
        Self::with_history_limit(id, created_at, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(id: RoomId, created_at: i64, history_limit: usize) -> Self {
        Self {
            id,
            created_at,
            members: Vec::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            last_sequence: 0,
        }
    }

    /// 接続を追加する。同じユーザーの既存の接続はそのまま残る。
    pub fn join(&mut self, member: Member) -> JoinOutcome {
        let first_connection = self.member(&member.id).is_none();
        self.members.push(member);
        self.members.sort_by(|a, b| a.id.cmp(&b.id));

        JoinOutcome {
            first_connection,
            members: self.members.clone(),
            participants: self.participants().into_iter().cloned().collect(),
        }
    }

    /// `connection_id` の接続を取り除く。
    ///
    /// 既に取り除かれた接続や他人の接続であれば何もせず `false` を返す。
    pub fn leave(&mut self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        let before = self.members.len();
        self.members
            .retain(|m| !(m.id == *user_id && m.connection_id == connection_id));
        self.members.len() != before
    }

    /// メッセージを採番して履歴に追加する
    pub fn post(
        &mut self,
        author_id: UserId,
        body: MessageBody,
        code_reference: Option<CodeReference>,
        client_temp_id: Option<String>,
        timestamp: i64,
    ) -> StoredMessage {
        self.last_sequence += 1;
        let message = StoredMessage {
            sequence_id: self.last_sequence,
            room_id: self.id.clone(),
            author_id,
            body,
            code_reference,
            timestamp,
            client_temp_id,
        };

        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(message.clone());
        message
    }

    /// 全接続
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// ユーザー単位の参加者一覧（ユーザーごとに最初の接続）
    pub fn participants(&self) -> Vec<&Member> {
        let mut participants: Vec<&Member> = self.members.iter().collect();
        participants.dedup_by(|a, b| a.id == b.id);
        participants
    }

    pub fn member(&self, user_id: &UserId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == *user_id)
    }

    pub fn history(&self) -> impl ExactSizeIterator<Item = &StoredMessage> {
        self.history.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

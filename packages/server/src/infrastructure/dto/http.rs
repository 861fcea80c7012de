//! HTTP API のレスポンス DTO

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: String,
    pub display_name: String,
    /// RFC 3339 (UTC)
    pub joined_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailDto {
    pub id: String,
    pub members: Vec<MemberDto>,
    pub message_count: usize,
    pub last_sequence_id: Option<String>,
    /// RFC 3339 (UTC)
    pub created_at: String,
}

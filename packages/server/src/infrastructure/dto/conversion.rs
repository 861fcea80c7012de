//! Domain Model → DTO の変換

use collab_shared::{
    protocol::{ParticipantInfo, ServerFrame},
    time::millis_to_rfc3339,
};

use crate::domain::{Member, Room, StoredMessage};

use super::http::{MemberDto, RoomDetailDto};

impl From<&Member> for ParticipantInfo {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.as_str().to_string(),
            display_name: member.display_name.clone(),
        }
    }
}

impl From<StoredMessage> for ServerFrame {
    fn from(message: StoredMessage) -> Self {
        ServerFrame::Chat {
            sequence_id: message.sequence_id.to_string(),
            room_id: message.room_id.as_str().to_string(),
            author_id: message.author_id.as_str().to_string(),
            body: message.body.into_string(),
            timestamp: message.timestamp,
            code_reference: message.code_reference,
            client_temp_id: message.client_temp_id,
        }
    }
}

impl From<&Member> for MemberDto {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.as_str().to_string(),
            display_name: member.display_name.clone(),
            joined_at: millis_to_rfc3339(member.joined_at),
        }
    }
}

impl From<&Room> for RoomDetailDto {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.as_str().to_string(),
            members: room.participants().into_iter().map(MemberDto::from).collect(),
            message_count: room.history().len(),
            last_sequence_id: room.history().last().map(|m| m.sequence_id.to_string()),
            created_at: millis_to_rfc3339(room.created_at),
        }
    }
}

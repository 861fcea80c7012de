//! Message formatting utilities for terminal display.

use collab_shared::time::{millis_to_clock_time, millis_to_rfc3339};

use crate::{
    error::TerminalConnectionError,
    message_log::ChatMessage,
    presence::{Participant, PresenceSnapshot},
    state::SessionState,
};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the participant list of a presence snapshot
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Current presence snapshot
    /// * `current_user_id` - The current user's ID (to mark as "me")
    pub fn format_participants(snapshot: &PresenceSnapshot, current_user_id: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{}\nParticipants:\n", RULE));

        if snapshot.participants.is_empty() {
            output.push_str("(No participants)\n");
        } else {
            for participant in &snapshot.participants {
                let me_suffix = if participant.id == current_user_id {
                    " (me)"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "{} [{}]{} {}\n",
                    participant.display_name,
                    participant.id,
                    me_suffix,
                    participant.color_tag.as_deref().unwrap_or("")
                ));
            }
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    pub fn format_participant_joined(participant: &Participant) -> String {
        format!(
            "\n+ {} [{}] joined\n",
            participant.display_name, participant.id
        )
    }

    pub fn format_participant_left(participant: &Participant) -> String {
        format!("\n- {} [{}] left\n", participant.display_name, participant.id)
    }

    /// Format a chat message, with its code reference when present
    ///
    /// Messages authored by `current_user_id` are shown as "me".
    pub fn format_chat_message(message: &ChatMessage, current_user_id: &str) -> String {
        let author = if message.author_id == current_user_id {
            "me"
        } else {
            message.author_id.as_str()
        };
        let reference = message
            .code_reference
            .as_ref()
            .map(|r| format!("  ↳ {}\n", r))
            .unwrap_or_default();

        format!(
            "\n\n{}\n@{}: {}\n{}sent at {}\n{}\n",
            THIN_RULE,
            author,
            message.body,
            reference,
            millis_to_rfc3339(message.timestamp),
            THIN_RULE
        )
    }

    /// Format the local echo of a message that awaits acknowledgement
    pub fn format_sent_confirmation(message: &ChatMessage) -> String {
        format!("queued at {} (pending)\n", millis_to_clock_time(message.timestamp))
    }

    pub fn format_state_change(state: SessionState) -> String {
        match state {
            SessionState::Connected => "\n[connected]\n".to_string(),
            SessionState::Reconnecting => "\n[connection lost, reconnecting...]\n".to_string(),
            other => format!("\n[{}]\n", other),
        }
    }

    pub fn format_terminal_error(error: &TerminalConnectionError) -> String {
        format!("\n[disconnected] {}\n", error)
    }
}

//! Wire protocol for room channels.
//!
//! Every frame is a JSON text message tagged by `type`, with camelCase fields:
//!
//! ```json
//! {"type":"CHAT","repositoryId":"repo-1","message":"hi","codeReference":null,"clientTempId":"..."}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pointer to a line range inside a repository file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReference {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeReferenceError {
    #[error("code reference path must not be empty")]
    EmptyPath,

    #[error("invalid line range {start}-{end}: lines are 1-based and start must not exceed end")]
    InvalidRange { start: u32, end: u32 },

    #[error("malformed code reference '{0}', expected PATH:START[-END]")]
    Malformed(String),
}

impl CodeReference {
    pub fn new(
        path: impl Into<String>,
        start_line: u32,
        end_line: u32,
    ) -> Result<Self, CodeReferenceError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(CodeReferenceError::EmptyPath);
        }
        if start_line == 0 || start_line > end_line {
            return Err(CodeReferenceError::InvalidRange {
                start: start_line,
                end: end_line,
            });
        }
        Ok(Self {
            path,
            start_line,
            end_line,
        })
    }

    /// Parse `PATH:START-END` or `PATH:LINE`.
    pub fn parse(input: &str) -> Result<Self, CodeReferenceError> {
        let malformed = || CodeReferenceError::Malformed(input.to_string());

        let (path, range) = input.rsplit_once(':').ok_or_else(malformed)?;
        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (start, end),
            None => (range, range),
        };
        let start: u32 = start.trim().parse().map_err(|_| malformed())?;
        let end: u32 = end.trim().parse().map_err(|_| malformed())?;

        Self::new(path, start, end)
    }
}

impl fmt::Display for CodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}", self.path, self.start_line)
        } else {
            write!(f, "{}:{}-{}", self.path, self.start_line, self.end_line)
        }
    }
}

/// Participant as announced by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: String,
    pub display_name: String,
}

/// Frames sent from a client to the room server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientFrame {
    Chat {
        repository_id: String,
        message: String,
        code_reference: Option<CodeReference>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_temp_id: Option<String>,
    },
}

/// Frames pushed from the room server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerFrame {
    /// Sent once to a client right after it joins.
    RoomSnapshot {
        room_id: String,
        participants: Vec<ParticipantInfo>,
    },
    ParticipantJoined {
        room_id: String,
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        room_id: String,
        participant_id: String,
    },
    Chat {
        sequence_id: String,
        room_id: String,
        author_id: String,
        body: String,
        /// Unix timestamp in milliseconds.
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_reference: Option<CodeReference>,
        /// Echo of the sender's temporary id; doubles as the acknowledgement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_temp_id: Option<String>,
    },
    Error {
        message: String,
    },
}

//! Connection state of a socket session.

use std::fmt;

/// Lifecycle state of a [`SocketSession`](crate::session::SocketSession).
///
/// ```text
/// Disconnected --connect--> Connecting --open--> Connected
/// Connected --unexpected close--> Reconnecting --open--> Connected
/// Reconnecting --attempts exhausted--> Failed
/// any --disconnect--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl SessionState {
    /// `true` while a connection is open or being established.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Reconnecting
        )
    }

    /// `true` for states that only `connect` can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

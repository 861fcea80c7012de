//! Realtime connection manager for the Collab IDE.
//!
//! One WebSocket channel per active repository ("room") carries chat messages and
//! presence. The pieces:
//!
//! - `config`: resolves the endpoint and reconnect policy from the deployment mode
//! - `session`: the socket session state machine with reconnect and epoch guard
//! - `presence`: single-writer observable participant list
//! - `message_log`: bounded chat log with pending/acknowledged reconciliation
//! - `transport`: the connector seam and its WebSocket implementation
//! - `runner`, `formatter`, `input`, `ui`: the terminal front-end

pub mod config;
pub mod error;
pub mod formatter;
pub mod input;
pub mod message_log;
pub mod presence;
pub mod reconnect;
pub mod runner;
pub mod session;
pub mod state;
pub mod transport;
pub mod ui;

pub use config::{ConnectionConfig, DeploymentMode};
pub use error::{ClientError, TerminalConnectionError, TransportError};
pub use message_log::{ChatMessage, MessageLog};
pub use presence::{Participant, PresenceStore, PresenceWriter};
pub use runner::run_client;
pub use session::{OutgoingMessage, SessionEvent, SocketSession};
pub use state::SessionState;

//! Reference room server for Collab.
//!
//! Speaks the same JSON frame protocol as the client's socket session: one room per
//! repository, one connection per user and room, per-room sequence ids, and an echo of
//! every chat message to its author as the acknowledgement.
//!
//! - `domain`: value objects, rooms and the repository / pusher traits
//! - `usecase`: join, leave, post and room detail
//! - `infrastructure`: in-memory repository, WebSocket pusher, DTOs
//! - `ui`: axum router, handlers and graceful shutdown

pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub use ui::Server;

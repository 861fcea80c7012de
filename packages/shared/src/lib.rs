//! Types and utilities shared by the Collab realtime client and the reference room server.

pub mod logger;
pub mod protocol;
pub mod time;

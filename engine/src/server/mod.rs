//! Synchronizer for sound servers that push change notifications.

pub mod backend;
pub mod connection;
pub mod entity;
pub mod protocol;

pub use backend::{ServerBackend, ServerOptions};
pub use connection::{Connection, ConnectionState};
pub use protocol::{ConnectTarget, EventSink, ServerConnection, ServerEvent, ServerRequest};

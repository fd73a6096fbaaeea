//! WebSocket support: connection registry, message envelopes, route handler.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::ConnectionManager;

//! WebSocket message types.
//!
//! A generic envelope format is used in both directions; payloads are JSON
//! values routed by the `type` field.

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "connected", "notification")
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Feature-specific payload (JSON value)
    pub payload: serde_json::Value,
}

impl ServerMessage {
    /// Create a new server message with the given type and payload.
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a server message with a null payload.
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Client heartbeat request.
    pub const PING: &str = "ping";
    /// Server heartbeat response.
    pub const PONG: &str = "pong";
    /// Server error response.
    pub const ERROR: &str = "error";
    /// Notification delivery push (server -> client). Payload is the full
    /// notification record; there is no acknowledgment protocol.
    pub const NOTIFICATION: &str = "notification";
}

/// System-level payloads (not feature-specific).
pub mod system {
    use serde::{Deserialize, Serialize};

    /// Sent immediately after the connection is registered.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Connected {
        pub connection_id: u64,
        pub server_version: String,
    }

    /// Sent when the server cannot process a client message.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_type_field() {
        let msg = ServerMessage::new(msg_types::PONG, serde_json::json!({}));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "pong");
    }

    #[test]
    fn client_message_payload_defaults_to_null() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg.msg_type, "ping");
        assert!(msg.payload.is_null());
    }
}

//! Wire protocol for client-server communication.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use psh_bridge_core::{ChannelId, Status, StatusCode};
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create an interactive shell channel.
    ShellStart { request_id: u64 },
    /// Run one command outside any shell.
    Execute {
        request_id: u64,
        #[serde(default)]
        code: Option<String>,
    },
    /// Data for a channel (base64 encoded).
    ChannelWrite {
        request_id: u64,
        channel_id: ChannelId,
        data: String,
    },
    /// Start or pause interactive delivery on a channel.
    ChannelInteract {
        request_id: u64,
        channel_id: ChannelId,
        interact: bool,
    },
    /// Close a channel.
    ChannelClose {
        request_id: u64,
        channel_id: ChannelId,
    },
    /// Ping for keepalive.
    Ping,
}

impl ClientMessage {
    /// Create a channel write from raw bytes.
    #[must_use]
    pub fn channel_write(request_id: u64, channel_id: ChannelId, data: &[u8]) -> Self {
        Self::ChannelWrite {
            request_id,
            channel_id,
            data: BASE64.encode(data),
        }
    }

    /// Decode channel write data from base64.
    #[must_use]
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        if let Self::ChannelWrite { data, .. } = self {
            BASE64.decode(data).ok()
        } else {
            None
        }
    }

    /// Request id, if the message expects a response.
    #[must_use]
    pub const fn request_id(&self) -> Option<u64> {
        match self {
            Self::ShellStart { request_id }
            | Self::Execute { request_id, .. }
            | Self::ChannelWrite { request_id, .. }
            | Self::ChannelInteract { request_id, .. }
            | Self::ChannelClose { request_id, .. } => Some(*request_id),
            Self::Ping => None,
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Outcome of a request.
    Response {
        request_id: u64,
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<ChannelId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Output pushed on a channel (base64 encoded).
    ChannelData { channel_id: ChannelId, data: String },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Successful response with no payload.
    #[must_use]
    pub const fn ok(request_id: u64) -> Self {
        Self::Response {
            request_id,
            status: Status::SUCCESS,
            result: None,
            channel_id: None,
            error: None,
        }
    }

    /// Failed response carrying the error's status.
    #[must_use]
    pub fn failure<E: StatusCode + std::fmt::Display>(request_id: u64, err: &E) -> Self {
        Self::Response {
            request_id,
            status: err.status(),
            result: None,
            channel_id: None,
            error: Some(err.to_string()),
        }
    }

    /// Create a channel data message from raw bytes.
    #[must_use]
    pub fn channel_data(channel_id: ChannelId, data: &[u8]) -> Self {
        Self::ChannelData {
            channel_id,
            data: BASE64.encode(data),
        }
    }

    /// Decode channel data from base64.
    #[must_use]
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        if let Self::ChannelData { data, .. } = self {
            BASE64.decode(data).ok()
        } else {
            None
        }
    }

    /// Status of a response message.
    #[must_use]
    pub const fn status(&self) -> Option<Status> {
        if let Self::Response { status, .. } = self {
            Some(*status)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use psh_bridge_core::ChannelError;

    use super::*;

    #[test]
    fn test_channel_write_roundtrip() {
        let msg = ClientMessage::channel_write(4, 1, b"Get-Date");
        assert_eq!(msg.decode_data().unwrap(), b"Get-Date");
        assert_eq!(msg.request_id(), Some(4));
    }

    #[test]
    fn test_execute_without_code_parses() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"execute","request_id":9}"#).unwrap();
        match parsed {
            ClientMessage::Execute { request_id, code } => {
                assert_eq!(request_id, 9);
                assert!(code.is_none());
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let json = serde_json::to_string(&ServerMessage::ok(3)).unwrap();
        assert_eq!(json, r#"{"type":"response","request_id":3,"status":0}"#);
    }

    #[test]
    fn test_failure_carries_status() {
        let msg = ServerMessage::failure(1, &ChannelError::MissingParameter("code"));
        assert_eq!(msg.status(), Some(Status::INVALID_PARAMETER));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"status\":87"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_channel_data_decodes() {
        let msg = ServerMessage::channel_data(2, b"2PS > ");
        assert_eq!(msg.decode_data().unwrap(), b"2PS > ");
        assert!(ServerMessage::Pong.decode_data().is_none());
    }
}

//! WebSocket messages and graphql-transport-ws frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::Message;

/// WebSocket message types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
    /// Ping message.
    Ping(Vec<u8>),
    /// Pong message.
    Pong(Vec<u8>),
    /// Close message.
    Close(Option<CloseFrame>),
}

impl SocketMessage {
    /// Create a text message.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text(data.into())
    }

    /// Check if this is a close message.
    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Parse a text or binary payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Text(text) => serde_json::from_str(text),
            Self::Binary(bytes) => serde_json::from_slice(bytes),
            _ => Err(serde::de::Error::custom("not a data message")),
        }
    }
}

impl From<Message> for SocketMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text.to_string()),
            Message::Binary(bytes) => Self::Binary(bytes.to_vec()),
            Message::Ping(bytes) => Self::Ping(bytes.to_vec()),
            Message::Pong(bytes) => Self::Pong(bytes.to_vec()),
            Message::Close(frame) => Self::Close(frame.map(|frame| CloseFrame {
                code: frame.code.into(),
                reason: frame.reason.to_string(),
            })),
            Message::Frame(_) => Self::Binary(vec![]),
        }
    }
}

impl From<SocketMessage> for Message {
    fn from(message: SocketMessage) -> Self {
        match message {
            SocketMessage::Text(text) => Self::Text(text.into()),
            SocketMessage::Binary(bytes) => Self::Binary(bytes.into()),
            SocketMessage::Ping(bytes) => Self::Ping(bytes.into()),
            SocketMessage::Pong(bytes) => Self::Pong(bytes.into()),
            SocketMessage::Close(frame) => {
                use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
                use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
                Self::Close(frame.map(|frame| WsCloseFrame {
                    code: CloseCode::from(frame.code),
                    reason: frame.reason.into(),
                }))
            }
        }
    }
}

/// WebSocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code.
    pub code: u16,
    /// Close reason.
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(1000, "Normal closure")
    }
}

/// A graphql-transport-ws protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Frame type tag.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Operation id, for frames scoped to one operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Frame payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WireMessage {
    /// `connection_init` frame opening the protocol handshake.
    #[must_use]
    pub fn connection_init(payload: Option<Value>) -> Self {
        Self {
            message_type: "connection_init".to_string(),
            id: None,
            payload,
        }
    }

    /// `subscribe` frame starting one operation.
    #[must_use]
    pub fn subscribe(id: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: "subscribe".to_string(),
            id: Some(id.into()),
            payload: Some(payload),
        }
    }

    /// `complete` frame stopping one operation.
    #[must_use]
    pub fn complete(id: impl Into<String>) -> Self {
        Self {
            message_type: "complete".to_string(),
            id: Some(id.into()),
            payload: None,
        }
    }

    /// `pong` frame answering a protocol-level ping.
    #[must_use]
    pub fn pong(id: Option<String>, payload: Option<Value>) -> Self {
        Self {
            message_type: "pong".to_string(),
            id,
            payload,
        }
    }

    /// Whether this frame acknowledges the connection handshake.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.message_type == "connection_ack"
    }
}

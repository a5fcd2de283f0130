//! WebSocket wire protocol
//!
//! Every frame is an envelope `{"type": ..., "data": ...}`. Client frames are
//! decoded in two steps: the `type` discriminant first, then `data` against
//! the payload shape that type implies. Unknown types are ignored; a known
//! type with a malformed payload is a protocol error reported to the sender.

use pharmchat_shared::{ChatMessage, SenderKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Application-level heartbeat
    Ping,

    /// Post a message into a conversation
    SendMessage(SendMessageData),

    /// Typing indicator for a conversation
    Typing(TypingData),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendMessageData {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub attachment_name: Option<String>,
    #[serde(default)]
    pub attachment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypingData {
    pub conversation_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid message format")]
    MalformedEnvelope(#[source] serde_json::Error),
    #[error("invalid {kind} payload")]
    MalformedPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientFrame {
    /// Decode a text frame; `Ok(None)` for a well-formed envelope of unknown type
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;

        let frame = match envelope.kind.as_str() {
            "ping" => ClientFrame::Ping,
            "send_message" => ClientFrame::SendMessage(payload("send_message", envelope.data)?),
            "typing" => ClientFrame::Typing(payload("typing", envelope.data)?),
            _ => return Ok(None),
        };

        Ok(Some(frame))
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::MalformedPayload { kind, source })
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Heartbeat response
    Pong,

    /// A message was posted in a conversation this client takes part in
    NewMessage(ChatMessage),

    /// Ephemeral typing signal
    Typing(TypingEvent),

    /// The preceding client frame could not be processed
    Error { message: String },
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TypingEvent {
    pub conversation_id: Uuid,
    pub is_typing: bool,
    pub sender_type: SenderKind,
    pub sender_id: Uuid,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Pong => "pong",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Serialize to the text frame written on the socket
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

//! Realtime wire vocabulary.
//!
//! Frames are JSON text. Client-produced frames and most server-produced
//! frames carry a `"type"` discriminator with camelCase fields. The one
//! exception is the chat broadcast: the server pushes a bare [`Message`]
//! object with no `"type"`, so an untyped frame that decodes as a message is
//! a `new_message`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ChatId, UserId};
use crate::message::Message;
use crate::user::UserRef;

/// Events pushed from server to client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// A message was posted (includes the sender's own messages).
    NewMessage(Box<Message>),
    /// Someone started or stopped typing.
    TypingIndicator {
        chat_id: ChatId,
        user: UserRef,
        is_typing: bool,
    },
    /// Chat metadata changed; list views should refetch.
    ChatUpdated { chat_id: ChatId },
    /// A user came online or went offline.
    UserStatusUpdate { user_id: UserId, is_online: bool },
}

impl ServerEvent {
    /// Logical event name, independent of framing.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::TypingIndicator { .. } => "typing_indicator",
            ServerEvent::ChatUpdated { .. } => "chat_updated",
            ServerEvent::UserStatusUpdate { .. } => "user_status_update",
        }
    }

    /// The chat this event is scoped to, if any.
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            ServerEvent::NewMessage(msg) => Some(msg.chat_id),
            ServerEvent::TypingIndicator { chat_id, .. } => Some(*chat_id),
            ServerEvent::ChatUpdated { chat_id } => Some(*chat_id),
            ServerEvent::UserStatusUpdate { .. } => None,
        }
    }
}

/// Frames produced by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_id: ChatId },
    #[serde(rename_all = "camelCase")]
    LeaveChat { chat_id: ChatId },
    #[serde(rename_all = "camelCase")]
    Typing { chat_id: ChatId, is_typing: bool },
}

impl ClientFrame {
    pub fn name(&self) -> &'static str {
        match self {
            ClientFrame::JoinChat { .. } => "join_chat",
            ClientFrame::LeaveChat { .. } => "leave_chat",
            ClientFrame::Typing { .. } => "typing",
        }
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Json)
    }
}

/// Failure to decode a server frame.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

/// Typed server frames, as they appear on the wire.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedFrame {
    #[serde(rename_all = "camelCase")]
    TypingIndicator {
        chat_id: ChatId,
        user: UserRef,
        #[serde(default)]
        is_typing: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ChatUpdated { chat_id: ChatId },
    #[serde(rename_all = "camelCase")]
    UserStatusUpdate { user_id: UserId, is_online: bool },
    NewMessage { message: Box<Message> },
}

const KNOWN_TYPES: &[&str] = &[
    "typing_indicator",
    "chat_updated",
    "user_status_update",
    "new_message",
];

/// Decode one text frame from the server.
pub fn decode_frame(text: &str) -> Result<ServerEvent, WireError> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    let kind = value.get("type").and_then(|t| t.as_str()).map(str::to_owned);
    match kind {
        None => {
            let message: Message = serde_json::from_value(value)?;
            Ok(ServerEvent::NewMessage(Box::new(message)))
        }
        Some(kind) if !KNOWN_TYPES.contains(&kind.as_str()) => Err(WireError::UnknownType(kind)),
        Some(_) => Ok(match serde_json::from_value::<TypedFrame>(value)? {
            TypedFrame::TypingIndicator { chat_id, user, is_typing } => ServerEvent::TypingIndicator {
                chat_id,
                user,
                is_typing: is_typing.unwrap_or(false),
            },
            TypedFrame::ChatUpdated { chat_id } => ServerEvent::ChatUpdated { chat_id },
            TypedFrame::UserStatusUpdate { user_id, is_online } => {
                ServerEvent::UserStatusUpdate { user_id, is_online }
            }
            TypedFrame::NewMessage { message } => ServerEvent::NewMessage(message),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

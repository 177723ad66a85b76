//! Client-side event vocabulary.
//!
//! [`ClientEvent`] is everything the [`EventDispatcher`](crate::EventDispatcher)
//! carries: server pushes forwarded by the connection manager, plus local
//! lifecycle events (connect/disconnect, session start/end, forced logout).
//! [`EventName`] is the subscription key; its string forms are the logical
//! event names used on the wire and in logs.

use chitchat_types::{ChatId, ServerEvent, UserId};
use strum::{AsRefStr, Display, EnumString};

/// Subscription key. Insertion order of subscribers is preserved per name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventName {
    Connect,
    Disconnect,
    Error,
    ConnectError,
    NewMessage,
    TypingIndicator,
    ChatUpdated,
    UserStatusUpdate,
    SessionReady,
    SessionEnded,
    AuthRejected,
}

/// Events delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// The transport for `chat_id` finished its handshake.
    Connect { chat_id: ChatId },
    /// The binding to `chat_id` ended, locally or remotely.
    Disconnect {
        chat_id: ChatId,
        code: Option<u16>,
        reason: String,
    },
    /// A local failure that never reached the transport (e.g. no credential).
    Error { message: String },
    /// The handshake for `chat_id` failed.
    ConnectError { chat_id: ChatId, message: String },
    /// A server push, already decoded.
    Server(ServerEvent),
    /// A session was established or restored.
    SessionReady { user_id: UserId },
    /// The session was cleared.
    SessionEnded,
    /// Some component saw the server reject the credential.
    AuthRejected { reason: String },
}

impl ClientEvent {
    pub fn name(&self) -> EventName {
        match self {
            ClientEvent::Connect { .. } => EventName::Connect,
            ClientEvent::Disconnect { .. } => EventName::Disconnect,
            ClientEvent::Error { .. } => EventName::Error,
            ClientEvent::ConnectError { .. } => EventName::ConnectError,
            ClientEvent::Server(ServerEvent::NewMessage(_)) => EventName::NewMessage,
            ClientEvent::Server(ServerEvent::TypingIndicator { .. }) => EventName::TypingIndicator,
            ClientEvent::Server(ServerEvent::ChatUpdated { .. }) => EventName::ChatUpdated,
            ClientEvent::Server(ServerEvent::UserStatusUpdate { .. }) => {
                EventName::UserStatusUpdate
            }
            ClientEvent::SessionReady { .. } => EventName::SessionReady,
            ClientEvent::SessionEnded => EventName::SessionEnded,
            ClientEvent::AuthRejected { .. } => EventName::AuthRejected,
        }
    }

    /// The server event carried, if this is a forwarded push.
    pub fn as_server(&self) -> Option<&ServerEvent> {
        match self {
            ClientEvent::Server(event) => Some(event),
            _ => None,
        }
    }
}

impl From<ServerEvent> for ClientEvent {
    fn from(event: ServerEvent) -> Self {
        ClientEvent::Server(event)
    }
}

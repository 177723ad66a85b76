//! Chat messages.
//!
//! A `Message` is immutable once received. Its `id` is the identity used for
//! deduplication when the same message reaches a client twice (history fetch
//! overlapping a broadcast, or a local echo followed by the server copy).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MessageId, UserId};
use crate::user::User;

/// A message as stored and broadcast by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    #[serde(with = "crate::timestamp", alias = "created_at")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_bot_message: bool,
    /// Nested sender details; absent in some list responses.
    #[serde(default)]
    pub sender: Option<User>,
}

impl Message {
    /// Display name of whoever sent this message.
    pub fn sender_name(&self) -> String {
        match &self.sender {
            Some(user) => user.display_name().to_string(),
            None if self.is_bot_message => "Bot".to_string(),
            None => format!("user {}", self.sender_id),
        }
    }

    pub fn is_from(&self, user: UserId) -> bool {
        self.sender_id == user
    }
}

/// Body of `POST /chats/{id}/messages`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
}

//! User identity types.
//!
//! `User` is the full REST representation (`GET /users/me`, contacts, message
//! senders). `UserRef` is the compact `{id, name}` form the server embeds in
//! typing indicators; the typing set is keyed by its `id`.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A registered account, human or bot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Bot accounts answer in bot chats and on `@gemini` mentions.
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    /// Name for display: full name when set, otherwise the email address.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }

    /// The compact reference form of this user.
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            name: Some(self.display_name().to_string()),
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.display_name(), self.email)
    }
}

/// Compact user reference carried by realtime events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

impl UserRef {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("user {}", self.id))
    }
}

// ============================================================================
// Tests
// ============================================================================

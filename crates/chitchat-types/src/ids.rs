//! Typed identifiers for users, chats, and messages.
//!
//! The backend hands out integer primary keys, so every ID is a transparent
//! `i64` newtype on the wire. Wrapping them keeps a `ChatId` from being passed
//! where a `UserId` is expected, which matters in a layer whose whole job is
//! deciding whether an event belongs to the chat currently on screen.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A user identifier (humans and bot accounts alike).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// A chat room identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(i64);

/// A message identifier. Messages are deduplicated by this value.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a raw server-assigned key.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw key, for URL paths and logging.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $T {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$T> for i64 {
            fn from(id: $T) -> i64 {
                id.0
            }
        }

        impl FromStr for $T {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_typed_id!(UserId, "UserId");
impl_typed_id!(ChatId, "ChatId");
impl_typed_id!(MessageId, "MessageId");

// ============================================================================
// Tests
// ============================================================================

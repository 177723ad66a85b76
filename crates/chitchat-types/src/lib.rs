//! Shared identity, chat, and realtime wire types for ChitChat.
//!
//! This is a leaf crate with **no internal chitchat dependencies**: the REST
//! bodies and realtime frames that client crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! User (UserId) ← human or bot account
//!     └── participates in Chat (ChatId)
//!     └── sends Message (MessageId)
//!
//! Chat (ChatId) ← one_on_one, group, or bot conversation
//!     └── participants: Vec<Participant>
//!     └── messages: history page (detail endpoint only)
//!
//! ServerEvent ← realtime push, scoped to a chat except presence updates
//! ClientFrame ← join_chat / leave_chat / typing
//! ```

pub mod auth;
pub mod chat;
pub mod ids;
pub mod message;
pub mod timestamp;
pub mod user;
pub mod wire;

// Re-export primary types at crate root for convenience.
pub use auth::{Credentials, SignupRequest, SignupResponse, TokenResponse};
pub use chat::{Chat, ChatType, NewChat, Participant};
pub use ids::{ChatId, MessageId, UserId};
pub use message::{Message, NewMessage};
pub use user::{User, UserRef};
pub use wire::{ClientFrame, ServerEvent, WireError, decode_frame};

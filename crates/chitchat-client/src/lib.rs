//! ChitChat client state layer
//!
//! Keeps one client's view of chats, messages, typing indicators, and the
//! realtime connection consistent with the server across reconnects and
//! chat switches.
//!
//! ```text
//!   SessionStore ── login/restore ──▶ credential + bearer header
//!        │
//!   ChatRoom::load ──▶ ConnectionManager::connect ──▶ Connector (WebSocket)
//!                                │
//!                          EventDispatcher ──▶ ChatRoom / ChatDirectory handlers
//! ```
//!
//! Everything is wired by [`ClientContext`]; there is no global state.

pub mod api;
pub mod config;
pub mod connection;
pub mod constants;
pub mod context;
pub mod credentials;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod room;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use api::{BearerAuth, ChatApi, HttpApi};
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use context::ClientContext;
pub use credentials::{CredentialStore, FileCredentials, MemoryCredentials};
pub use directory::{ChatDirectory, filter_contacts, plan_new_chat, preview};
pub use dispatcher::{EventDispatcher, Subscription};
pub use error::{ClientError, TransportError};
pub use events::{ClientEvent, EventName};
pub use room::ChatRoom;
pub use session::{Session, SessionStore};
pub use transport::{
    Connector, LinkEvent, MemoryConnector, MemoryPeer, OpenBehavior, TransportLink, WsConnector,
};

//! Realtime transport seam.
//!
//! A [`Connector`] opens one [`TransportLink`] per chat binding. The link is a
//! pair of channels, so the connection manager never touches socket types:
//!
//! ```text
//!   ConnectionManager                      transport task(s)
//!   ┌──────────────────┐   ClientFrame    ┌───────────────────────┐
//!   │ link.outbound ───┼────────────────▶ │ writer: encode + send │
//!   │                  │                  │                       │
//!   │ link.inbound  ◀──┼──────────────────┤ reader: decode frames │
//!   └──────────────────┘    LinkEvent     └───────────────────────┘
//! ```
//!
//! Dropping the outbound sender closes the transport. The reader reports the
//! end of the stream exactly once, as `Closed` or `Failed`.

mod memory;
mod ws;

use async_trait::async_trait;
use chitchat_types::{ChatId, ClientFrame, ServerEvent};
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use memory::{MemoryConnector, MemoryPeer, OpenBehavior};
pub use ws::WsConnector;

/// What the transport reports back to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A decoded server push.
    Frame(ServerEvent),
    /// The peer closed the stream.
    Closed { code: Option<u16>, reason: String },
    /// The stream broke.
    Failed(String),
}

/// An open transport bound to one chat.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl TransportLink {
    /// Build a link plus the far ends of its channels.
    pub fn pair() -> (
        TransportLink,
        mpsc::UnboundedReceiver<ClientFrame>,
        mpsc::UnboundedSender<LinkEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens transports. The handshake is the only suspension point.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, chat_id: ChatId, token: &str) -> Result<TransportLink, TransportError>;
}

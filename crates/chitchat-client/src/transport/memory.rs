//! In-process transport for tests and embedding.
//!
//! Every successful `open` yields a [`MemoryPeer`] on the receiver returned
//! by [`MemoryConnector::new`]. The peer plays the server: it pushes events,
//! observes client frames, and closes the link. Handshake outcomes are
//! scripted per call with [`OpenBehavior`]; unscripted opens are accepted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chitchat_types::{ChatId, ClientFrame, ServerEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connector, LinkEvent, TransportLink};
use crate::error::TransportError;

/// Scripted outcome of one `open` call.
#[derive(Clone, Debug)]
pub enum OpenBehavior {
    Accept,
    /// Accept after sleeping (exercises overlapping connects).
    Delay(Duration),
    /// The server refuses the credential.
    Reject(String),
    /// The server is unreachable.
    Fail(String),
    /// The handshake never completes.
    Hang,
}

#[derive(Default)]
struct Script {
    behaviors: VecDeque<OpenBehavior>,
    opens: Vec<(ChatId, String)>,
}

/// Connector backed by in-memory channels.
#[derive(Clone)]
pub struct MemoryConnector {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Arc::new(Mutex::new(Script::default())),
                peers,
            },
            rx,
        )
    }

    /// Queue the outcome of the next unscripted `open`.
    pub fn push_behavior(&self, behavior: OpenBehavior) {
        self.script.lock().behaviors.push_back(behavior);
    }

    /// Every `(chat, token)` a handshake was attempted with, in order.
    pub fn opens(&self) -> Vec<(ChatId, String)> {
        self.script.lock().opens.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, chat_id: ChatId, token: &str) -> Result<TransportLink, TransportError> {
        let behavior = {
            let mut script = self.script.lock();
            script.opens.push((chat_id, token.to_string()));
            script.behaviors.pop_front().unwrap_or(OpenBehavior::Accept)
        };

        match behavior {
            OpenBehavior::Accept => {}
            OpenBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            OpenBehavior::Reject(reason) => return Err(TransportError::Rejected(reason)),
            OpenBehavior::Fail(reason) => return Err(TransportError::Connect(reason)),
            OpenBehavior::Hang => futures::future::pending::<()>().await,
        }

        let (link, frames, events) = TransportLink::pair();
        let peer = MemoryPeer {
            chat_id,
            token: token.to_string(),
            events,
            frames,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("memory server gone".to_string()))?;
        Ok(link)
    }
}

/// Server side of one in-memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    pub chat_id: ChatId,
    pub token: String,
    events: mpsc::UnboundedSender<LinkEvent>,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MemoryPeer {
    /// Push a server event. Returns `false` once the client stopped listening.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.events.send(LinkEvent::Frame(event)).is_ok()
    }

    /// Close the link from the server side.
    pub fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.events.send(LinkEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Break the link.
    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(LinkEvent::Failed(reason.to_string()));
    }

    /// Next frame the client sent; `None` once the client dropped the link.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.frames.recv().await
    }

    /// Frames already sent, without waiting.
    pub fn drain_frames(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client has released its end of the link.
    pub fn is_released(&self) -> bool {
        self.events.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_hands_out_peer() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut link = connector.open(ChatId::new(3), "tok").await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.chat_id, ChatId::new(3));
        assert_eq!(peer.token, "tok");

        link.outbound
            .send(ClientFrame::JoinChat { chat_id: ChatId::new(3) })
            .unwrap();
        assert_eq!(
            peer.next_frame().await,
            Some(ClientFrame::JoinChat { chat_id: ChatId::new(3) })
        );

        peer.close(Some(1000), "bye");
        assert!(matches!(link.inbound.recv().await, Some(LinkEvent::Closed { code: Some(1000), .. })));
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let (connector, _peers) = MemoryConnector::new();
        connector.push_behavior(OpenBehavior::Reject("1008".into()));
        connector.push_behavior(OpenBehavior::Fail("refused".into()));

        assert!(matches!(
            connector.open(ChatId::new(1), "t").await,
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            connector.open(ChatId::new(1), "t").await,
            Err(TransportError::Connect(_))
        ));
        assert_eq!(connector.opens().len(), 2);
    }

    #[tokio::test]
    async fn test_release_is_observable() {
        let (connector, mut peers) = MemoryConnector::new();
        let link = connector.open(ChatId::new(1), "t").await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert!(!peer.is_released());
        drop(link);
        assert!(peer.is_released());
        assert_eq!(peer.next_frame().await, None);
    }
}

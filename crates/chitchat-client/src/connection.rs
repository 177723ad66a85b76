//! Connection Manager: lifecycle of the single realtime binding.
//!
//! At most one transport is live per client. It is bound to one chat at a
//! time, and the last `connect` caller wins:
//!
//! ```text
//!   Disconnected ──connect──▶ Connecting ──handshake ok──▶ Open
//!        ▲                        │                          │
//!        │                   handshake failed        remote close/error
//!        │                        ▼                          ▼
//!        └────────disconnect───── Closed ◀───────────────────┘
//! ```
//!
//! Every binding gets a fresh epoch. Handshakes, inbound frames and close
//! notifications carry the epoch they were started under and are dropped once
//! a newer binding (or a `disconnect`) has superseded it. That is what keeps
//! a late frame from chat A out of chat B, and what guarantees exactly one
//! `disconnect` for A before B's `connect`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chitchat_types::{ChatId, ClientFrame, ServerEvent};
use parking_lot::{Mutex, ReentrantMutex};
use strum::Display;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{CLOSE_NOT_PARTICIPANT, CLOSE_POLICY_VIOLATION};
use crate::credentials::CredentialStore;
use crate::dispatcher::EventDispatcher;
use crate::error::{ClientError, TransportError};
use crate::events::ClientEvent;
use crate::transport::{Connector, LinkEvent, TransportLink};

/// Lifecycle state of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// The last binding ended without a local `disconnect`.
    Closed,
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    /// Non-null only while `Connecting` or `Open`.
    bound_chat: Option<ChatId>,
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    reader: Option<CancellationToken>,
}

impl Inner {
    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, chat = ?self.bound_chat, epoch = self.epoch, "connection state");
            self.state = next;
        }
    }

    /// Detach the current binding, invalidating its epoch.
    fn take_binding(&mut self) -> Option<Teardown> {
        let chat_id = self.bound_chat.take()?;
        self.epoch += 1;
        Some(Teardown {
            chat_id,
            was_open: self.state == ConnectionState::Open,
            outbound: self.outbound.take(),
            reader: self.reader.take(),
        })
    }
}

/// A binding detached under the lock, finished after releasing it.
struct Teardown {
    chat_id: ChatId,
    was_open: bool,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    reader: Option<CancellationToken>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialStore>,
    dispatcher: EventDispatcher,
    connect_timeout: Duration,
    inner: Mutex<Inner>,
    /// Serializes lifecycle publishes with inbound frames, so a frame that
    /// passed its epoch check is out before the next `disconnect`/`connect`.
    /// Reentrant because handlers may disconnect from inside a publish.
    /// Never taken while `inner` is held.
    gate: ReentrantMutex<()>,
}

impl Shared {
    fn publish(&self, event: &ClientEvent) {
        let _gate = self.gate.lock();
        self.dispatcher.publish(event);
    }

    /// Publish a frame of the binding started under `epoch`, unless a newer
    /// binding has superseded it.
    fn publish_current(&self, epoch: u64, event: ServerEvent) -> bool {
        let _gate = self.gate.lock();
        if self.inner.lock().epoch != epoch {
            return false;
        }
        self.dispatcher.publish(&ClientEvent::Server(event));
        true
    }

    fn finish_teardown(&self, teardown: Teardown, reason: &str) {
        let Teardown { chat_id, was_open, outbound, reader } = teardown;
        if let Some(outbound) = outbound {
            let _ = outbound.send(ClientFrame::LeaveChat { chat_id });
            // Dropping the sender closes the transport.
        }
        if let Some(reader) = reader {
            reader.cancel();
        }
        if was_open {
            self.publish(&ClientEvent::Disconnect {
                chat_id,
                code: None,
                reason: reason.to_string(),
            });
        } else {
            debug!(%chat_id, "abandoned pending handshake");
        }
    }

    /// The transport for `epoch` ended on its own.
    fn remote_close(&self, epoch: u64, chat_id: ChatId, code: Option<u16>, reason: String) {
        let _gate = self.gate.lock();
        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch || inner.state != ConnectionState::Open {
                debug!(%chat_id, epoch, "ignoring close of superseded binding");
                return;
            }
            inner.bound_chat = None;
            inner.outbound = None;
            inner.reader = None;
            inner.transition(ConnectionState::Closed);
        }

        warn!(%chat_id, ?code, %reason, "connection closed by server");
        self.publish(&ClientEvent::Disconnect {
            chat_id,
            code,
            reason: reason.clone(),
        });
        if matches!(code, Some(CLOSE_POLICY_VIOLATION | CLOSE_NOT_PARTICIPANT)) {
            self.publish(&ClientEvent::AuthRejected { reason });
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(reader) = self.inner.get_mut().reader.take() {
            reader.cancel();
        }
    }
}

/// Cloneable handle to the process's single realtime connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialStore>,
        dispatcher: EventDispatcher,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                credentials,
                dispatcher,
                connect_timeout,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    bound_chat: None,
                    epoch: 0,
                    outbound: None,
                    reader: None,
                }),
                gate: ReentrantMutex::new(()),
            }),
        }
    }

    /// Bind the connection to `chat_id`.
    ///
    /// A no-op when already open on that chat. Any other binding is torn down
    /// first (publishing its `disconnect`). Without a credential this fails
    /// with [`ClientError::AuthMissing`] before any handshake. If another
    /// `connect` or a `disconnect` supersedes this one while the handshake is
    /// in flight, the result is [`ClientError::StaleApply`] and the new
    /// transport is released.
    pub async fn connect(&self, chat_id: ChatId) -> Result<(), ClientError> {
        let shared = &self.shared;

        let token = match shared.credentials.load() {
            Ok(Some(token)) => token,
            Ok(None) => {
                shared.publish(&ClientEvent::Error {
                    message: ClientError::AuthMissing.to_string(),
                });
                return Err(ClientError::AuthMissing);
            }
            Err(e) => {
                warn!("failed to read credential: {e}");
                shared.publish(&ClientEvent::Error {
                    message: format!("failed to read credential: {e}"),
                });
                return Err(ClientError::AuthMissing);
            }
        };

        let (epoch, previous) = {
            let mut inner = shared.inner.lock();
            if inner.state == ConnectionState::Open && inner.bound_chat == Some(chat_id) {
                debug!(%chat_id, "already bound");
                return Ok(());
            }
            let previous = inner.take_binding();
            inner.epoch += 1;
            inner.bound_chat = Some(chat_id);
            inner.transition(ConnectionState::Connecting);
            (inner.epoch, previous)
        };
        if let Some(previous) = previous {
            shared.finish_teardown(previous, "rebinding to another chat");
        }

        let opened = match tokio::time::timeout(
            shared.connect_timeout,
            shared.connector.open(chat_id, &token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        let link = {
            let mut inner = shared.inner.lock();
            if inner.epoch != epoch {
                drop(inner);
                debug!(%chat_id, epoch, "handshake superseded; releasing transport");
                return Err(ClientError::StaleApply { chat_id });
            }
            match opened {
                Ok(TransportLink { outbound, inbound }) => {
                    let _ = outbound.send(ClientFrame::JoinChat { chat_id });
                    let reader = CancellationToken::new();
                    inner.outbound = Some(outbound);
                    inner.reader = Some(reader.clone());
                    inner.transition(ConnectionState::Open);
                    (inbound, reader)
                }
                Err(e) => {
                    inner.bound_chat = None;
                    inner.transition(ConnectionState::Closed);
                    drop(inner);

                    warn!(%chat_id, "connect failed: {e}");
                    shared.publish(&ClientEvent::ConnectError {
                        chat_id,
                        message: e.to_string(),
                    });
                    if let TransportError::Rejected(reason) = &e {
                        shared.publish(&ClientEvent::AuthRejected {
                            reason: reason.clone(),
                        });
                    }
                    return Err(e.into());
                }
            }
        };

        shared.publish(&ClientEvent::Connect { chat_id });

        let (inbound, reader) = link;
        tokio::spawn(pump(Arc::downgrade(shared), chat_id, epoch, inbound, reader));
        Ok(())
    }

    /// Tear down the current binding, if any. Always safe to call.
    pub fn disconnect(&self) {
        let teardown = {
            let mut inner = self.shared.inner.lock();
            let teardown = inner.take_binding();
            inner.transition(ConnectionState::Disconnected);
            teardown
        };
        if let Some(teardown) = teardown {
            self.shared.finish_teardown(teardown, "client disconnect");
        }
    }

    /// Fire-and-forget send. Dropped with a warning unless `Open`.
    pub fn send(&self, frame: ClientFrame) {
        let inner = self.shared.inner.lock();
        match (&inner.outbound, inner.state) {
            (Some(outbound), ConnectionState::Open) => {
                if outbound.send(frame).is_err() {
                    warn!("transport gone; frame dropped");
                }
            }
            _ => warn!(frame = frame.name(), state = %inner.state, "not connected; frame dropped"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.inner.lock().state == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn bound_chat(&self) -> Option<ChatId> {
        self.shared.inner.lock().bound_chat
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &inner.state)
            .field("bound_chat", &inner.bound_chat)
            .field("epoch", &inner.epoch)
            .finish()
    }
}

/// Forward one binding's inbound events until it ends or is superseded.
async fn pump(
    shared: Weak<Shared>,
    chat_id: ChatId,
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = inbound.recv() => event,
        };
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match event {
            Some(LinkEvent::Frame(event)) => {
                let name = event.name();
                if !shared.publish_current(epoch, event) {
                    debug!(%chat_id, event = name, "dropping frame from superseded binding");
                    return;
                }
            }
            Some(LinkEvent::Closed { code, reason }) => {
                shared.remote_close(epoch, chat_id, code, reason);
                return;
            }
            Some(LinkEvent::Failed(reason)) => {
                shared.remote_close(epoch, chat_id, None, reason);
                return;
            }
            None => {
                shared.remote_close(epoch, chat_id, None, "transport dropped".to_string());
                return;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

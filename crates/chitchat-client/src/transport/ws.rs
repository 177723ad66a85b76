//! WebSocket transport via tokio-tungstenite.
//!
//! One socket per chat binding, addressed as `{socket_url}/ws/{chat_id}/{token}`.
//! The backend authenticates from the path and answers a bad credential
//! either with an HTTP error on upgrade or an immediate close frame, so both
//! forms surface as [`TransportError::Rejected`] / [`LinkEvent::Closed`].

use async_trait::async_trait;
use chitchat_types::{ChatId, decode_frame};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use super::{Connector, LinkEvent, TransportLink};
use crate::error::TransportError;

/// Production [`Connector`].
#[derive(Debug, Clone)]
pub struct WsConnector {
    socket_url: Url,
}

impl WsConnector {
    /// `socket_url` must use the `ws` or `wss` scheme.
    pub fn new(socket_url: Url) -> Result<Self, TransportError> {
        match socket_url.scheme() {
            "ws" | "wss" => Ok(Self { socket_url }),
            other => Err(TransportError::InvalidUrl(format!(
                "expected ws:// or wss://, got {other}://"
            ))),
        }
    }

    /// Endpoint for one chat. The token is part of the path.
    pub fn endpoint(&self, chat_id: ChatId, token: &str) -> String {
        format!(
            "{}/ws/{}/{}",
            self.socket_url.as_str().trim_end_matches('/'),
            chat_id,
            token
        )
    }

    /// Endpoint with the token masked, for logs.
    fn redacted_endpoint(&self, chat_id: ChatId) -> String {
        self.endpoint(chat_id, "<token>")
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, chat_id: ChatId, token: &str) -> Result<TransportLink, TransportError> {
        debug!(endpoint = %self.redacted_endpoint(chat_id), "opening websocket");

        let (socket, _response) = connect_async(self.endpoint(chat_id, token))
            .await
            .map_err(|e| match e {
                WsError::Http(response) => {
                    let status = response.status();
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        TransportError::Rejected(format!("HTTP {status}"))
                    } else {
                        TransportError::Connect(format!("HTTP {status}"))
                    }
                }
                other => TransportError::Connect(other.to_string()),
            })?;

        info!(%chat_id, "websocket open");

        let (link, mut out_rx, in_tx) = TransportLink::pair();
        let (mut sink, mut stream) = socket.split();

        // Writer: drain outbound frames until the owner drops the sender.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(frame = frame.name(), "failed to encode frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::text(text)).await {
                    warn!(%chat_id, "websocket send failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!(%chat_id, "websocket writer finished");
        });

        // Reader: decode frames and report the end of the stream once.
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => match decode_frame(text.as_str()) {
                        Ok(event) => {
                            if in_tx.send(LinkEvent::Frame(event)).is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(%chat_id, "dropping undecodable frame: {e}"),
                    },
                    Ok(WsMessage::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                            None => (None, String::new()),
                        };
                        let _ = in_tx.send(LinkEvent::Closed { code, reason });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(LinkEvent::Failed(e.to_string()));
                        return;
                    }
                }
            }
            let _ = in_tx.send(LinkEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
        });

        Ok(link)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Error taxonomy for the client layer.
//!
//! REST and transport failures stop at the view-model / session boundary and
//! become one of these variants. Every variant has a [`ClientError::user_message`]
//! suitable for display; none of them is meant to reach the UI as a panic.

use chitchat_types::ChatId;
use thiserror::Error;

/// Errors surfaced by the session store, connection manager, and view models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No credential is present; nothing was attempted.
    #[error("not signed in")]
    AuthMissing,
    /// The server rejected the credential. Triggers a forced logout.
    #[error("credential rejected: {0}")]
    AuthRejected(String),
    /// Login or signup failed. Invalid credentials and unreachable servers
    /// are deliberately collapsed into this one class.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// REST endpoint or transport unreachable. Retryable.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The server refused the request for a non-auth reason.
    #[error("request rejected ({status}): {detail}")]
    Api { status: u16, detail: String },
    /// A result arrived for a chat that is no longer the active one.
    #[error("stale result for chat {chat_id} discarded")]
    StaleApply { chat_id: ChatId },
    /// Caller-side validation failure.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Message for display to the user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::AuthMissing => "Please sign in to continue.".to_string(),
            ClientError::AuthRejected(_) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ClientError::AuthenticationFailed(_) => {
                "Authentication failed. Check your email and password and try again.".to_string()
            }
            ClientError::NetworkFailure(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ClientError::Api { detail, .. } => detail.clone(),
            ClientError::StaleApply { .. } => String::new(),
            ClientError::InvalidInput(reason) => reason.clone(),
            ClientError::Config(reason) => format!("Configuration problem: {reason}"),
        }
    }

    /// Whether trying the same operation again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::NetworkFailure(_))
    }

    /// Stale results are discarded silently rather than shown.
    pub fn is_silent(&self) -> bool {
        matches!(self, ClientError::StaleApply { .. })
    }
}

/// Failures from the realtime transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("handshake rejected: {0}")]
    Rejected(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("handshake timed out")]
    Timeout,
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rejected(reason) => ClientError::AuthRejected(reason),
            TransportError::InvalidUrl(reason) => ClientError::Config(reason),
            other => ClientError::NetworkFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_map_to_taxonomy() {
        assert!(matches!(
            ClientError::from(TransportError::Rejected("1008".into())),
            ClientError::AuthRejected(_)
        ));
        let timeout = ClientError::from(TransportError::Timeout);
        assert!(timeout.is_retryable());
        assert!(matches!(
            ClientError::from(TransportError::InvalidUrl("ftp://x".into())),
            ClientError::Config(_)
        ));
    }

    #[test]
    fn test_user_messages() {
        assert!(ClientError::AuthMissing.user_message().contains("sign in"));
        let api = ClientError::Api { status: 404, detail: "Chat not found".into() };
        assert_eq!(api.user_message(), "Chat not found");
        assert!(!api.is_retryable());
        assert!(ClientError::StaleApply { chat_id: ChatId::new(1) }.is_silent());
    }
}

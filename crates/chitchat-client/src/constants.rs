//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default REST base URL for local development.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:9000/api";

/// Environment variable overriding the REST base URL.
pub const API_URL_ENV: &str = "CHITCHAT_API_URL";

/// Environment variable overriding the realtime socket base URL.
pub const SOCKET_URL_ENV: &str = "CHITCHAT_SOCKET_URL";

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "chitchat";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// The well-known key (file name) the credential token is persisted under.
pub const CREDENTIAL_FILE_NAME: &str = "auth_token";

/// Timeout for the transport handshake. Prevents a connect from hanging on
/// a blackholed server; the binding fails with a network error instead.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single REST call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A typing entry not refreshed within this window is evicted.
pub const TYPING_TTL: Duration = Duration::from_secs(5);

/// Local inactivity after which a `typing: false` frame is sent.
pub const TYPING_IDLE: Duration = Duration::from_millis(1500);

/// How often the typing sweeper checks for stale entries.
pub const TYPING_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Close code the backend uses when it rejects the socket credential.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code the backend uses when the user is not a chat participant.
pub const CLOSE_NOT_PARTICIPANT: u16 = 4003;

//! Client configuration.
//!
//! Loaded from `<config_dir>/chitchat/config.ron`; every field is optional
//! and a missing file means defaults. `CHITCHAT_API_URL` and
//! `CHITCHAT_SOCKET_URL` override the file.
//!
//! ```ron
//! (
//!     api_base_url: "https://chat.example.com/api",
//!     connect_timeout: (secs: 5, nanos: 0),
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    API_URL_ENV, CONFIG_DIR_NAME, CONFIG_FILE_NAME, CONNECT_TIMEOUT, CREDENTIAL_FILE_NAME,
    DEFAULT_API_BASE_URL, REQUEST_TIMEOUT, SOCKET_URL_ENV, TYPING_IDLE, TYPING_TTL,
};
use crate::error::ClientError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST base, including the `/api` prefix.
    pub api_base_url: String,
    /// Realtime base. Derived from `api_base_url` when absent.
    pub socket_url: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Typing entries not refreshed within this window are evicted.
    pub typing_ttl: Duration,
    /// Local inactivity before a `typing: false` frame goes out.
    pub typing_idle: Duration,
    pub credential_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            socket_url: None,
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            typing_ttl: TYPING_TTL,
            typing_idle: TYPING_IDLE,
            credential_path: None,
        }
    }
}

impl ClientConfig {
    /// `<config_dir>/chitchat`, if the platform has a config dir.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ClientError> {
        let mut config = match Self::config_dir() {
            Some(dir) => Self::load_from(&dir.join(CONFIG_FILE_NAME))?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ClientError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "loading config");
                Self::from_ron(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ClientError::Config(format!("{}: {e}", path.display()))),
        }
    }

    pub fn from_ron(text: &str) -> Result<Self, ClientError> {
        ron::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(SOCKET_URL_ENV).ok(),
        );
    }

    pub fn apply_overrides(&mut self, api_base_url: Option<String>, socket_url: Option<String>) {
        if let Some(url) = api_base_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = socket_url.filter(|u| !u.trim().is_empty()) {
            self.socket_url = Some(url);
        }
    }

    /// REST base URL, always ending in `/` so relative joins keep the prefix.
    pub fn api_url(&self) -> Result<Url, ClientError> {
        let mut text = self.api_base_url.trim().to_string();
        if !text.ends_with('/') {
            text.push('/');
        }
        let url = Url::parse(&text)
            .map_err(|e| ClientError::Config(format!("api_base_url {text:?}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ClientError::Config(format!(
                "api_base_url must be http or https, got {other}"
            ))),
        }
    }

    /// Realtime base URL: the explicit `socket_url`, or the API authority
    /// with `http→ws` / `https→wss` and the path dropped.
    pub fn socket_url(&self) -> Result<Url, ClientError> {
        if let Some(text) = &self.socket_url {
            return Url::parse(text.trim())
                .map_err(|e| ClientError::Config(format!("socket_url {text:?}: {e}")));
        }

        let mut url = self.api_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Config(format!("cannot derive {scheme} url from api_base_url")))?;
        url.set_path("");
        url.set_query(None);
        Ok(url)
    }

    /// Where the credential token lives.
    pub fn credential_path(&self) -> Result<PathBuf, ClientError> {
        match &self.credential_path {
            Some(path) => Ok(path.clone()),
            None => Self::config_dir()
                .map(|dir| dir.join(CREDENTIAL_FILE_NAME))
                .ok_or_else(|| ClientError::Config("no platform config directory".to_string())),
        }
    }
}

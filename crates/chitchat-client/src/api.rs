//! REST collaborator.
//!
//! [`ChatApi`] is the seam the session store and view models call through;
//! [`HttpApi`] is the `reqwest` implementation against the backend's `/api`
//! routes. Status mapping:
//!
//! | response                       | error                          |
//! |--------------------------------|--------------------------------|
//! | 401                            | `AuthRejected(detail)`         |
//! | other 4xx / 5xx                | `Api { status, detail }`       |
//! | connect error, timeout         | `NetworkFailure`               |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chitchat_types::{
    Chat, ChatId, Credentials, Message, NewChat, NewMessage, SignupRequest, SignupResponse,
    TokenResponse, User,
};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::ClientError;

/// Every REST endpoint the client consumes.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /auth/token` (form-encoded).
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ClientError>;
    /// `POST /auth/signup`.
    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, ClientError>;
    /// `GET /users/me` with an explicit token.
    async fn current_user(&self, token: &str) -> Result<User, ClientError>;
    /// `GET /users/contacts`.
    async fn contacts(&self) -> Result<Vec<User>, ClientError>;
    /// `GET /chats/`.
    async fn chats(&self) -> Result<Vec<Chat>, ClientError>;
    /// `GET /chats/{id}` with participants and history.
    async fn chat(&self, chat_id: ChatId) -> Result<Chat, ClientError>;
    /// `POST /chats/`.
    async fn create_chat(&self, chat: &NewChat) -> Result<Chat, ClientError>;
    /// `POST /chats/{id}/messages`.
    async fn send_message(&self, chat_id: ChatId, message: &NewMessage) -> Result<Message, ClientError>;
    /// `GET /chats/{id}/messages`.
    async fn messages(&self, chat_id: ChatId) -> Result<Vec<Message>, ClientError>;
}

/// Authorization-header state derived from the session.
///
/// Shared between the session store (which sets and clears it) and the REST
/// collaborator (which reads it per request).
#[derive(Clone, Default)]
pub struct BearerAuth {
    token: Arc<RwLock<Option<String>>>,
}

impl BearerAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.token.read().is_some()
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").field("set", &self.is_set()).finish()
    }
}

/// `reqwest`-backed [`ChatApi`].
#[derive(Clone, Debug)]
pub struct HttpApi {
    client: Client,
    base: Url,
    auth: BearerAuth,
}

impl HttpApi {
    /// `base` is the API root (e.g. `http://localhost:9000/api/`).
    pub fn new(base: Url, auth: BearerAuth, request_timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        let mut base = base;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base, auth })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Config(format!("bad endpoint {path}: {e}")))
    }

    /// Attach the session's bearer token, or fail without a request.
    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        match self.auth.token() {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(ClientError::AuthMissing),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let request = self.authed(self.client.get(self.url(path)?))?;
        execute(request).await
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ClientError> {
        let request = self
            .client
            .post(self.url("auth/token")?)
            .form(&credentials.form_fields());
        execute(request).await
    }

    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, ClientError> {
        execute(self.client.post(self.url("auth/signup")?).json(request)).await
    }

    async fn current_user(&self, token: &str) -> Result<User, ClientError> {
        execute(self.client.get(self.url("users/me")?).bearer_auth(token)).await
    }

    async fn contacts(&self) -> Result<Vec<User>, ClientError> {
        self.get("users/contacts").await
    }

    async fn chats(&self) -> Result<Vec<Chat>, ClientError> {
        self.get("chats/").await
    }

    async fn chat(&self, chat_id: ChatId) -> Result<Chat, ClientError> {
        self.get(&format!("chats/{chat_id}")).await
    }

    async fn create_chat(&self, chat: &NewChat) -> Result<Chat, ClientError> {
        let request = self.authed(self.client.post(self.url("chats/")?).json(chat))?;
        execute(request).await
    }

    async fn send_message(&self, chat_id: ChatId, message: &NewMessage) -> Result<Message, ClientError> {
        let url = self.url(&format!("chats/{chat_id}/messages"))?;
        let request = self.authed(self.client.post(url).json(message))?;
        execute(request).await
    }

    async fn messages(&self, chat_id: ChatId) -> Result<Vec<Message>, ClientError> {
        self.get(&format!("chats/{chat_id}/messages")).await
    }
}

async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    trace!(url = %response.url(), %status, "response");

    if status.is_success() {
        return response.json::<T>().await.map_err(|e| ClientError::Api {
            status: status.as_u16(),
            detail: format!("unexpected response body: {e}"),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(status, &body);
    debug!(%status, %detail, "request rejected");
    if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::AuthRejected(detail))
    } else {
        Err(ClientError::Api {
            status: status.as_u16(),
            detail,
        })
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::NetworkFailure("request timed out".to_string())
    } else {
        ClientError::NetworkFailure(err.to_string())
    }
}

/// FastAPI puts a string in `detail`, or a list of validation errors with
/// `msg` fields.
fn error_detail(status: StatusCode, body: &str) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return fallback();
    };
    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if messages.is_empty() {
                fallback()
            } else {
                messages.join("; ")
            }
        }
        _ => fallback(),
    }
}

//! Composition root.
//!
//! Builds the one dispatcher, connection manager, and session store a client
//! process uses, and hands them out explicitly. View models take a
//! `&ClientContext` when they are entered; nothing reaches these through a
//! global.

use std::sync::Arc;

use crate::api::{BearerAuth, ChatApi, HttpApi};
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::credentials::{CredentialStore, FileCredentials};
use crate::dispatcher::EventDispatcher;
use crate::error::ClientError;
use crate::session::SessionStore;
use crate::transport::{Connector, WsConnector};

#[derive(Clone)]
pub struct ClientContext {
    config: ClientConfig,
    dispatcher: EventDispatcher,
    connection: ConnectionManager,
    session: SessionStore,
    api: Arc<dyn ChatApi>,
    auth: BearerAuth,
}

impl ClientContext {
    /// Wire the given collaborators together.
    ///
    /// `auth` must be the same header state the `api` reads from.
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        api: Arc<dyn ChatApi>,
        auth: BearerAuth,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        let connection = ConnectionManager::new(
            connector,
            Arc::clone(&credentials),
            dispatcher.clone(),
            config.connect_timeout,
        );
        let session = SessionStore::new(
            Arc::clone(&api),
            credentials,
            auth.clone(),
            connection.clone(),
            dispatcher.clone(),
        );
        Self {
            config,
            dispatcher,
            connection,
            session,
            api,
            auth,
        }
    }

    /// Production wiring: WebSocket transport, HTTP API, credential file.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = WsConnector::new(config.socket_url()?)?;
        let auth = BearerAuth::new();
        let api = HttpApi::new(config.api_url()?, auth.clone(), config.request_timeout)?;
        let credentials = FileCredentials::new(config.credential_path()?);
        Ok(Self::new(
            config,
            Arc::new(connector),
            Arc::new(api),
            auth,
            Arc::new(credentials),
        ))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn api(&self) -> Arc<dyn ChatApi> {
        Arc::clone(&self.api)
    }

    pub fn auth(&self) -> &BearerAuth {
        &self.auth
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("api_base_url", &self.config.api_base_url)
            .field("connection", &self.connection)
            .field("session", &self.session)
            .finish()
    }
}

//! Session Store: the authenticated identity and everything derived from it.
//!
//! A session exists from a successful login, signup, or credential restore
//! until logout or forced logout. Creating one writes the credential, sets
//! the bearer header, and swaps the snapshot in a single step; observers see
//! either the old session or the new one, never a mix. Ending one tears down
//! the connection and clears all three.
//!
//! Any component that sees the server reject the credential publishes
//! `auth_rejected`; the store answers with a forced logout.

use std::sync::{Arc, Weak};

use chitchat_types::{Credentials, SignupRequest, SignupResponse, User, UserId};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::api::{BearerAuth, ChatApi};
use crate::connection::ConnectionManager;
use crate::credentials::CredentialStore;
use crate::dispatcher::{EventDispatcher, Subscription};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventName};

/// The authenticated identity. Expiry is implicit: a 401 ends it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

struct Inner {
    api: Arc<dyn ChatApi>,
    credentials: Arc<dyn CredentialStore>,
    auth: BearerAuth,
    connection: ConnectionManager,
    dispatcher: EventDispatcher,
    session: RwLock<Option<Session>>,
    _forced_logout: Subscription,
}

impl Inner {
    fn install(&self, user: User, token: String) {
        if let Err(e) = self.credentials.save(&token) {
            warn!("failed to persist credential: {e}");
        }
        self.auth.set(token.clone());

        let previous = self.session.write().replace(Session {
            user: user.clone(),
            token,
        });
        if previous.is_some_and(|p| p.user.id != user.id) {
            debug!("identity changed; dropping previous binding");
            self.connection.disconnect();
        }

        info!(user_id = %user.id, "session ready");
        self.dispatcher.publish(&ClientEvent::SessionReady { user_id: user.id });
    }

    fn end(&self, reason: &str) {
        self.connection.disconnect();
        self.auth.clear();
        if let Err(e) = self.credentials.clear() {
            warn!("failed to clear credential: {e}");
        }
        let previous = self.session.write().take();
        if let Some(previous) = previous {
            info!(user_id = %previous.user.id, %reason, "session ended");
            self.dispatcher.publish(&ClientEvent::SessionEnded);
        }
    }
}

/// Cloneable handle to the client's session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(
        api: Arc<dyn ChatApi>,
        credentials: Arc<dyn CredentialStore>,
        auth: BearerAuth,
        connection: ConnectionManager,
        dispatcher: EventDispatcher,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let forced_logout = dispatcher.subscribe(EventName::AuthRejected, move |event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let reason = match event {
                    ClientEvent::AuthRejected { reason } => reason.as_str(),
                    _ => "credential rejected",
                };
                warn!(%reason, "forced logout");
                inner.end(reason);
            });
            Inner {
                api,
                credentials,
                auth,
                connection,
                dispatcher,
                session: RwLock::new(None),
                _forced_logout: forced_logout,
            }
        });
        Self { inner }
    }

    /// Restore a session from the persisted credential.
    ///
    /// `Ok(None)` when there is no credential. A rejected credential is
    /// cleared; a network failure leaves it for the next start. Either way
    /// the session stays empty and nothing is retried.
    pub async fn initialize(&self) -> Result<Option<User>, ClientError> {
        let token = match self.inner.credentials.load() {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("failed to read credential: {e}");
                return Ok(None);
            }
        };

        match self.inner.api.current_user(&token).await {
            Ok(user) => {
                self.inner.install(user.clone(), token);
                Ok(Some(user))
            }
            Err(ClientError::AuthRejected(reason)) => {
                info!(%reason, "stored credential rejected");
                if let Err(e) = self.inner.credentials.clear() {
                    warn!("failed to clear credential: {e}");
                }
                Err(ClientError::AuthRejected(reason))
            }
            Err(e) => {
                warn!("could not restore session: {e}");
                Err(e)
            }
        }
    }

    /// Exchange credentials for a session and return the resolved identity.
    ///
    /// On failure the previous session is untouched. Every failure cause is
    /// reported as [`ClientError::AuthenticationFailed`].
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ClientError> {
        let token = self
            .inner
            .api
            .login(credentials)
            .await
            .map_err(authentication_failed)?;
        self.establish(token.access_token).await
    }

    /// Register, then sign in as the new account.
    pub async fn signup(&self, request: &SignupRequest) -> Result<User, ClientError> {
        match self
            .inner
            .api
            .signup(request)
            .await
            .map_err(authentication_failed)?
        {
            SignupResponse::Token(token) => self.establish(token.access_token).await,
            SignupResponse::Created(user) => {
                debug!(user_id = %user.id, "account created; signing in");
                self.login(&request.credentials()).await
            }
        }
    }

    async fn establish(&self, token: String) -> Result<User, ClientError> {
        let user = self
            .inner
            .api
            .current_user(&token)
            .await
            .map_err(authentication_failed)?;
        self.inner.install(user.clone(), token);
        Ok(user)
    }

    /// Clear the session and tear down the connection. Idempotent.
    pub fn logout(&self) {
        self.inner.end("logout");
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.session.read().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.session.read().as_ref().map(|s| s.user.clone())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.inner.session.read().as_ref().map(Session::user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.read().is_some()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.inner.session.read())
            .finish()
    }
}

fn authentication_failed(err: ClientError) -> ClientError {
    match err {
        ClientError::AuthenticationFailed(_) => err,
        ClientError::AuthRejected(reason) => ClientError::AuthenticationFailed(reason),
        ClientError::Api { detail, .. } => ClientError::AuthenticationFailed(detail),
        other => ClientError::AuthenticationFailed(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::credentials::MemoryCredentials;
    use crate::test_support::{FakeApi, user};
    use crate::transport::{MemoryConnector, MemoryPeer};
    use chitchat_types::ChatId;
    use parking_lot::Mutex;

    struct Fixture {
        store: SessionStore,
        api: Arc<FakeApi>,
        credentials: Arc<MemoryCredentials>,
        auth: BearerAuth,
        connection: ConnectionManager,
        dispatcher: EventDispatcher,
        _peers: tokio::sync::mpsc::UnboundedReceiver<MemoryPeer>,
    }

    fn fixture(credentials: MemoryCredentials) -> Fixture {
        let api = Arc::new(FakeApi::new());
        api.add_user(user(1, "Amy"), "x");
        let credentials = Arc::new(credentials);
        let dispatcher = EventDispatcher::new();
        let (connector, peers) = MemoryConnector::new();
        let connection = ConnectionManager::new(
            Arc::new(connector),
            credentials.clone(),
            dispatcher.clone(),
            Duration::from_secs(1),
        );
        let auth = BearerAuth::new();
        let store = SessionStore::new(
            api.clone(),
            credentials.clone(),
            auth.clone(),
            connection.clone(),
            dispatcher.clone(),
        );
        Fixture { store, api, credentials, auth, connection, dispatcher, _peers: peers }
    }

    #[tokio::test]
    async fn test_login_installs_session_without_connecting() {
        let f = fixture(MemoryCredentials::new());
        let me = f
            .store
            .login(&Credentials::new("amy@example.com", "x"))
            .await
            .unwrap();

        assert_eq!(me.id, UserId::new(1));
        assert!(f.store.is_authenticated());
        assert!(f.auth.is_set());
        assert!(f.credentials.load().unwrap().is_some());
        assert!(!f.connection.is_connected());
        assert_eq!(f.connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_prior_session() {
        let f = fixture(MemoryCredentials::new());
        f.store.login(&Credentials::new("amy@example.com", "x")).await.unwrap();
        let before = f.store.current();

        let err = f
            .store
            .login(&Credentials::new("amy@example.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        assert_eq!(f.store.current(), before);

        f.api.set_offline(true);
        let err = f
            .store
            .login(&Credentials::new("amy@example.com", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        assert_eq!(f.store.current(), before);
    }

    #[tokio::test]
    async fn test_logout_twice() {
        let f = fixture(MemoryCredentials::new());
        let ended = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&ended);
        let _sub = f
            .dispatcher
            .subscribe(EventName::SessionEnded, move |_| *counter.lock() += 1);

        f.store.login(&Credentials::new("amy@example.com", "x")).await.unwrap();
        f.store.logout();
        assert!(!f.store.is_authenticated());
        f.store.logout();
        assert!(!f.store.is_authenticated());
        assert!(!f.auth.is_set());
        assert_eq!(f.credentials.load().unwrap(), None);
        assert_eq!(*ended.lock(), 1);
    }

    #[tokio::test]
    async fn test_initialize_restores_from_credential() {
        let f = fixture(MemoryCredentials::new());
        let token = f.api.issue_token(UserId::new(1));
        f.credentials.save(&token).unwrap();

        let restored = f.store.initialize().await.unwrap();
        assert_eq!(restored.map(|u| u.id), Some(UserId::new(1)));
        assert_eq!(f.auth.token(), Some(token));
    }

    #[tokio::test]
    async fn test_initialize_with_rejected_credential_clears_it() {
        let f = fixture(MemoryCredentials::with_token("expired"));
        let err = f.store.initialize().await.unwrap_err();
        assert!(matches!(err, ClientError::AuthRejected(_)));
        assert!(!f.store.is_authenticated());
        assert_eq!(f.credentials.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_initialize_offline_keeps_credential() {
        let f = fixture(MemoryCredentials::with_token("maybe-valid"));
        f.api.set_offline(true);
        let err = f.store.initialize().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!f.store.is_authenticated());
        assert_eq!(f.credentials.load().unwrap().as_deref(), Some("maybe-valid"));
    }

    #[tokio::test]
    async fn test_initialize_without_credential() {
        let f = fixture(MemoryCredentials::new());
        assert_eq!(f.store.initialize().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_signup_created_user_then_logs_in() {
        let f = fixture(MemoryCredentials::new());
        let request = SignupRequest {
            email: "bo@example.com".into(),
            password: "pw".into(),
            full_name: "Bo".into(),
        };
        let me = f.store.signup(&request).await.unwrap();
        assert_eq!(me.full_name.as_deref(), Some("Bo"));
        assert_eq!(f.store.user_id(), Some(me.id));
    }

    #[tokio::test]
    async fn test_auth_rejected_event_forces_logout() {
        let f = fixture(MemoryCredentials::new());
        f.store.login(&Credentials::new("amy@example.com", "x")).await.unwrap();
        f.connection.connect(ChatId::new(1)).await.unwrap();

        f.dispatcher.publish(&ClientEvent::AuthRejected { reason: "token expired".into() });

        assert!(!f.store.is_authenticated());
        assert!(!f.auth.is_set());
        assert!(!f.connection.is_connected());
        assert_eq!(f.credentials.load().unwrap(), None);
    }
}

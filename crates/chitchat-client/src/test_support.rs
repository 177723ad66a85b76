//! In-process REST fake and fixtures for unit tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chitchat_types::{
    Chat, ChatId, ChatType, Credentials, Message, MessageId, NewChat, NewMessage, Participant,
    SignupRequest, SignupResponse, TokenResponse, User, UserId,
};
use parking_lot::Mutex;

use crate::api::ChatApi;
use crate::error::ClientError;

pub(crate) fn user(id: i64, name: &str) -> User {
    User {
        id: UserId::new(id),
        email: format!("{}@example.com", name.to_lowercase()),
        full_name: Some(name.to_string()),
        is_bot: false,
    }
}

pub(crate) fn bot(id: i64, name: &str) -> User {
    User { is_bot: true, ..user(id, name) }
}

pub(crate) fn message(id: i64, chat: i64, sender: &User, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        chat_id: ChatId::new(chat),
        sender_id: sender.id,
        content: content.to_string(),
        timestamp: chrono::Utc::now(),
        is_bot_message: sender.is_bot,
        sender: Some(sender.clone()),
    }
}

pub(crate) fn chat(id: i64, chat_type: ChatType, members: &[&User], history: Vec<Message>) -> Chat {
    Chat {
        id: ChatId::new(id),
        name: None,
        chat_type,
        creator_id: members.first().map(|u| u.id),
        created_at: None,
        updated_at: None,
        participants: members
            .iter()
            .map(|u| Participant {
                user_id: u.id,
                joined_at: None,
                user: Some((*u).clone()),
            })
            .collect(),
        messages: history,
        last_message: None,
    }
}

#[derive(Default)]
struct State {
    users: Vec<(User, String)>,
    tokens: HashMap<String, UserId>,
    chats: Vec<Chat>,
    delays: HashMap<ChatId, Duration>,
    offline: bool,
    reject_auth: bool,
    sent: Vec<(ChatId, String)>,
    next_id: i64,
}

/// Scriptable [`ChatApi`] backed by in-memory tables.
#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        let api = Self::default();
        api.state.lock().next_id = 1000;
        api
    }

    pub(crate) fn add_user(&self, user: User, password: &str) {
        self.state.lock().users.push((user, password.to_string()));
    }

    pub(crate) fn add_chat(&self, chat: Chat) {
        self.state.lock().chats.push(chat);
    }

    pub(crate) fn issue_token(&self, user: UserId) -> String {
        let token = format!("token-{user}");
        self.state.lock().tokens.insert(token.clone(), user);
        token
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Make every bearer-authenticated call answer 401.
    pub(crate) fn set_reject_auth(&self, reject: bool) {
        self.state.lock().reject_auth = reject;
    }

    /// Delay `GET /chats/{id}` for one chat.
    pub(crate) fn delay_chat(&self, chat_id: ChatId, delay: Duration) {
        self.state.lock().delays.insert(chat_id, delay);
    }

    pub(crate) fn sent(&self) -> Vec<(ChatId, String)> {
        self.state.lock().sent.clone()
    }

    fn check_authed(&self) -> Result<(), ClientError> {
        let state = self.state.lock();
        if state.offline {
            return Err(ClientError::NetworkFailure("connection refused".into()));
        }
        if state.reject_auth {
            return Err(ClientError::AuthRejected("Could not validate credentials".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ClientError> {
        let user_id = {
            let state = self.state.lock();
            if state.offline {
                return Err(ClientError::NetworkFailure("connection refused".into()));
            }
            state
                .users
                .iter()
                .find(|(u, pw)| u.email == credentials.email && *pw == credentials.password)
                .map(|(u, _)| u.id)
        };
        match user_id {
            Some(id) => Ok(TokenResponse {
                access_token: self.issue_token(id),
                token_type: "bearer".into(),
            }),
            None => Err(ClientError::AuthRejected("Incorrect email or password".into())),
        }
    }

    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, ClientError> {
        let mut state = self.state.lock();
        if state.users.iter().any(|(u, _)| u.email == request.email) {
            return Err(ClientError::Api {
                status: 400,
                detail: "Email already registered".into(),
            });
        }
        let created = User {
            id: UserId::new(state.users.len() as i64 + 1),
            email: request.email.clone(),
            full_name: Some(request.full_name.clone()),
            is_bot: false,
        };
        state.users.push((created.clone(), request.password.clone()));
        Ok(SignupResponse::Created(created))
    }

    async fn current_user(&self, token: &str) -> Result<User, ClientError> {
        let state = self.state.lock();
        if state.offline {
            return Err(ClientError::NetworkFailure("connection refused".into()));
        }
        state
            .tokens
            .get(token)
            .and_then(|id| state.users.iter().find(|(u, _)| u.id == *id))
            .map(|(u, _)| u.clone())
            .ok_or_else(|| ClientError::AuthRejected("Could not validate credentials".into()))
    }

    async fn contacts(&self) -> Result<Vec<User>, ClientError> {
        self.check_authed()?;
        Ok(self.state.lock().users.iter().map(|(u, _)| u.clone()).collect())
    }

    async fn chats(&self) -> Result<Vec<Chat>, ClientError> {
        self.check_authed()?;
        Ok(self.state.lock().chats.clone())
    }

    async fn chat(&self, chat_id: ChatId) -> Result<Chat, ClientError> {
        self.check_authed()?;
        let delay = self.state.lock().delays.get(&chat_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| ClientError::Api {
                status: 404,
                detail: "Chat not found".into(),
            })
    }

    async fn create_chat(&self, new_chat: &NewChat) -> Result<Chat, ClientError> {
        self.check_authed()?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let members: Vec<User> = state
            .users
            .iter()
            .filter(|(u, _)| new_chat.participant_ids.contains(&u.id))
            .map(|(u, _)| u.clone())
            .collect();
        let refs: Vec<&User> = members.iter().collect();
        let mut created = chat(state.next_id, new_chat.chat_type, &refs, Vec::new());
        created.name = new_chat.name.clone();
        state.chats.push(created.clone());
        Ok(created)
    }

    async fn send_message(&self, chat_id: ChatId, new_message: &NewMessage) -> Result<Message, ClientError> {
        self.check_authed()?;
        let mut state = self.state.lock();
        state.next_id += 1;
        state.sent.push((chat_id, new_message.content.clone()));
        let sender = state
            .users
            .first()
            .map(|(u, _)| u.clone())
            .unwrap_or_else(|| user(1, "Amy"));
        let mut sent = message(state.next_id, chat_id.get(), &sender, &new_message.content);
        sent.chat_id = chat_id;
        Ok(sent)
    }

    async fn messages(&self, chat_id: ChatId) -> Result<Vec<Message>, ClientError> {
        self.chat(chat_id).await.map(|c| c.messages)
    }
}

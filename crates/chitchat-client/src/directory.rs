//! Chat Directory: the dashboard's chat list, contacts, and presence.
//!
//! `chat_updated` pushes only mark the list stale; the caller decides when
//! to [`refresh`](ChatDirectory::refresh). `user_status_update` pushes feed a
//! presence map consulted by [`is_online`](ChatDirectory::is_online).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chitchat_types::{Chat, ChatId, ChatType, NewChat, ServerEvent, User, UserId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::context::ClientContext;
use crate::dispatcher::{EventDispatcher, Subscription};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventName};

#[derive(Default)]
struct DirectoryState {
    chats: Vec<Chat>,
    stale: HashSet<ChatId>,
    presence: HashMap<UserId, bool>,
}

/// Dashboard view model.
pub struct ChatDirectory {
    api: Arc<dyn ChatApi>,
    dispatcher: EventDispatcher,
    state: Arc<Mutex<DirectoryState>>,
    _subscriptions: Vec<Subscription>,
}

impl ChatDirectory {
    pub fn enter(ctx: &ClientContext) -> Self {
        Self::new(ctx.api(), ctx.dispatcher().clone())
    }

    pub fn new(api: Arc<dyn ChatApi>, dispatcher: EventDispatcher) -> Self {
        let state = Arc::new(Mutex::new(DirectoryState::default()));

        let updates = Arc::clone(&state);
        let on_update = dispatcher.subscribe(EventName::ChatUpdated, move |event| {
            if let Some(ServerEvent::ChatUpdated { chat_id }) = event.as_server() {
                debug!(%chat_id, "chat marked stale");
                updates.lock().stale.insert(*chat_id);
            }
        });
        let presence = Arc::clone(&state);
        let on_status = dispatcher.subscribe(EventName::UserStatusUpdate, move |event| {
            if let Some(ServerEvent::UserStatusUpdate { user_id, is_online }) = event.as_server() {
                presence.lock().presence.insert(*user_id, *is_online);
            }
        });

        Self {
            api,
            dispatcher,
            state,
            _subscriptions: vec![on_update, on_status],
        }
    }

    /// Reload the chat list.
    pub async fn refresh(&self) -> Result<Vec<Chat>, ClientError> {
        let chats = self.api.chats().await.map_err(|e| self.report(e))?;
        let mut state = self.state.lock();
        state.chats = chats.clone();
        state.stale.clear();
        Ok(chats)
    }

    pub async fn contacts(&self) -> Result<Vec<User>, ClientError> {
        self.api.contacts().await.map_err(|e| self.report(e))
    }

    /// Create a chat and put it at the top of the list.
    pub async fn create_chat(&self, request: &NewChat) -> Result<Chat, ClientError> {
        let chat = self.api.create_chat(request).await.map_err(|e| self.report(e))?;
        let mut state = self.state.lock();
        state.chats.retain(|c| c.id != chat.id);
        state.chats.insert(0, chat.clone());
        Ok(chat)
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.state.lock().chats.clone()
    }

    /// Whether any chat changed since the last refresh.
    pub fn needs_refresh(&self) -> bool {
        !self.state.lock().stale.is_empty()
    }

    pub fn is_stale(&self, chat_id: ChatId) -> bool {
        self.state.lock().stale.contains(&chat_id)
    }

    /// Last presence pushed for `user`, if any.
    pub fn is_online(&self, user: UserId) -> Option<bool> {
        self.state.lock().presence.get(&user).copied()
    }

    fn report(&self, err: ClientError) -> ClientError {
        warn!("directory request failed: {err}");
        if let ClientError::AuthRejected(reason) = &err {
            self.dispatcher.publish(&ClientEvent::AuthRejected { reason: reason.clone() });
        }
        err
    }
}

impl std::fmt::Debug for ChatDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ChatDirectory")
            .field("chats", &state.chats.len())
            .field("stale", &state.stale.len())
            .finish()
    }
}

/// Contacts other than `me` whose full name contains `query`, ignoring case.
pub fn filter_contacts<'a>(contacts: &'a [User], me: Option<UserId>, query: &str) -> Vec<&'a User> {
    let query = query.trim().to_lowercase();
    contacts
        .iter()
        .filter(|c| Some(c.id) != me)
        .filter(|c| {
            query.is_empty()
                || c.full_name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&query))
        })
        .collect()
}

/// Decide the kind of chat to create from the selected contacts.
///
/// One bot is a bot chat, one person a one-on-one, several a group that
/// needs a name.
pub fn plan_new_chat(
    selected: &[UserId],
    contacts: &[User],
    group_name: Option<&str>,
) -> Result<NewChat, ClientError> {
    let chat_type = match selected {
        [] => {
            return Err(ClientError::InvalidInput(
                "Please select at least one contact.".to_string(),
            ));
        }
        [only] if contacts.iter().any(|c| c.id == *only && c.is_bot) => ChatType::Bot,
        [_] => ChatType::OneOnOne,
        _ => ChatType::Group,
    };

    let name = match chat_type {
        ChatType::Group => match group_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Some(name.to_string()),
            None => {
                return Err(ClientError::InvalidInput(
                    "Please enter a name for the group chat.".to_string(),
                ));
            }
        },
        _ => None,
    };

    Ok(NewChat {
        name,
        chat_type,
        participant_ids: selected.to_vec(),
    })
}

/// One-line summary of the latest message for a list row.
pub fn preview(chat: &Chat, me: Option<UserId>) -> String {
    match chat.latest_message() {
        None => "No messages yet.".to_string(),
        Some(message) if Some(message.sender_id) == me => format!("You: {}", message.content),
        Some(message) => format!("{}: {}", message.sender_name(), message.content),
    }
}

//! Chat View Model: one chat room's history, typing set, and metadata.
//!
//! State is reconciled from a REST fetch plus realtime deltas:
//!
//! ```text
//!   load(chat) ──GET /chats/{id}──▶ history ──▶ connect(chat)
//!                                                   │
//!   dispatcher ── new_message ──────▶ on_message ───┤ (dedupe by id)
//!              ── typing_indicator ─▶ on_typing ────┘ (TTL per user)
//! ```
//!
//! A room is a scope: [`ChatRoom::enter`] subscribes and starts the typing
//! sweeper, [`ChatRoom::leave`] (or drop) disposes both and releases the
//! connection if it is still bound to this room's chat.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chitchat_types::{
    Chat, ChatId, ClientFrame, Message, MessageId, NewMessage, ServerEvent, UserId, UserRef,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::api::ChatApi;
use crate::connection::ConnectionManager;
use crate::constants::TYPING_SWEEP_INTERVAL;
use crate::context::ClientContext;
use crate::dispatcher::{EventDispatcher, Subscription};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventName};

#[derive(Default)]
struct RoomState {
    active: Option<ChatId>,
    /// Bumped by every `load`; results from older loads are stale.
    generation: u64,
    /// Chat this room's own `connect` last bound. Survives `reset`: a
    /// failed or pending load leaves the previous binding in place.
    bound: Option<ChatId>,
    chat: Option<Chat>,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    typing: IndexMap<UserId, (UserRef, Instant)>,
    /// Deadline after which our own `typing: false` goes out.
    local_typing: Option<Instant>,
}

impl RoomState {
    fn reset(&mut self, chat_id: Option<ChatId>) {
        self.active = chat_id;
        self.chat = None;
        self.messages.clear();
        self.seen.clear();
        self.typing.clear();
        self.local_typing = None;
    }

    fn append(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

struct RoomInner {
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    dispatcher: EventDispatcher,
    typing_ttl: Duration,
    typing_idle: Duration,
    state: Mutex<RoomState>,
    /// Parent of every background task this room spawns.
    tasks: CancellationToken,
}

impl RoomInner {
    fn on_message(&self, message: &Message) -> bool {
        let mut state = self.state.lock();
        if state.active != Some(message.chat_id) {
            trace!(chat_id = %message.chat_id, "message for inactive chat ignored");
            return false;
        }
        let appended = state.append(message.clone());
        if !appended {
            trace!(id = %message.id, "duplicate message ignored");
        }
        appended
    }

    fn on_typing(&self, chat_id: ChatId, user: &UserRef, is_typing: bool) {
        let mut state = self.state.lock();
        if state.active != Some(chat_id) {
            return;
        }
        if is_typing {
            let expires = Instant::now() + self.typing_ttl;
            state.typing.insert(user.id, (user.clone(), expires));
        } else {
            state.typing.shift_remove(&user.id);
        }
    }

    fn sweep_typing(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.typing.len();
        state.typing.retain(|_, (_, expires)| *expires > now);
        let evicted = before - state.typing.len();
        if evicted > 0 {
            debug!(evicted, "expired typing entries");
        }
    }

    /// Clear our own typing flag, sending `typing: false` if it was set.
    fn stop_local_typing(&self) {
        let chat_id = {
            let mut state = self.state.lock();
            match (state.local_typing.take(), state.active) {
                (Some(_), Some(chat_id)) => chat_id,
                _ => return,
            }
        };
        self.connection.send(ClientFrame::Typing { chat_id, is_typing: false });
    }

    fn report(&self, err: &ClientError) {
        if let ClientError::AuthRejected(reason) = err {
            self.dispatcher.publish(&ClientEvent::AuthRejected { reason: reason.clone() });
        }
    }
}

/// View model for the chat currently on screen.
pub struct ChatRoom {
    inner: Arc<RoomInner>,
    subscriptions: Vec<Subscription>,
}

impl ChatRoom {
    /// Enter the chat-room scope using the context's collaborators.
    ///
    /// Must be called inside a tokio runtime.
    pub fn enter(ctx: &ClientContext) -> Self {
        Self::new(
            ctx.api(),
            ctx.connection().clone(),
            ctx.config().typing_ttl,
            ctx.config().typing_idle,
        )
    }

    pub fn new(
        api: Arc<dyn ChatApi>,
        connection: ConnectionManager,
        typing_ttl: Duration,
        typing_idle: Duration,
    ) -> Self {
        let dispatcher = connection.dispatcher().clone();
        let inner = Arc::new(RoomInner {
            api,
            connection,
            dispatcher: dispatcher.clone(),
            typing_ttl,
            typing_idle,
            state: Mutex::new(RoomState::default()),
            tasks: CancellationToken::new(),
        });

        let weak = Arc::downgrade(&inner);
        let on_message = dispatcher.subscribe(EventName::NewMessage, move |event| {
            if let (Some(inner), Some(ServerEvent::NewMessage(message))) =
                (weak.upgrade(), event.as_server())
            {
                inner.on_message(message);
            }
        });
        let weak = Arc::downgrade(&inner);
        let on_typing = dispatcher.subscribe(EventName::TypingIndicator, move |event| {
            if let (Some(inner), Some(ServerEvent::TypingIndicator { chat_id, user, is_typing })) =
                (weak.upgrade(), event.as_server())
            {
                inner.on_typing(*chat_id, user, *is_typing);
            }
        });

        tokio::spawn(sweeper(Arc::downgrade(&inner), inner.tasks.child_token()));

        Self {
            inner,
            subscriptions: vec![on_message, on_typing],
        }
    }

    /// Fetch `chat_id`'s history and participants, then bind the connection.
    ///
    /// If another `load` starts before this one's fetch resolves, this one
    /// returns [`ClientError::StaleApply`] and applies nothing.
    pub async fn load(&self, chat_id: ChatId) -> Result<(), ClientError> {
        if self.inner.tasks.is_cancelled() {
            return Err(ClientError::InvalidInput("This chat room has been left.".to_string()));
        }
        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.reset(Some(chat_id));
            state.generation
        };
        debug!(%chat_id, generation, "loading chat");

        let fetched = self.inner.api.chat(chat_id).await;

        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                debug!(%chat_id, generation, "discarding stale load");
                return Err(ClientError::StaleApply { chat_id });
            }
            match fetched {
                Ok(mut chat) => {
                    for message in std::mem::take(&mut chat.messages) {
                        state.append(message);
                    }
                    state.chat = Some(chat);
                }
                Err(e) => {
                    drop(state);
                    warn!(%chat_id, "failed to load chat: {e}");
                    self.inner.report(&e);
                    return Err(e);
                }
            }
        }

        self.inner.connection.connect(chat_id).await?;

        let mut state = self.inner.state.lock();
        state.bound = Some(chat_id);
        if state.generation != generation {
            return Err(ClientError::StaleApply { chat_id });
        }
        Ok(())
    }

    /// Apply a server message. Returns whether it was appended.
    pub fn on_message(&self, message: &Message) -> bool {
        self.inner.on_message(message)
    }

    /// Apply a typing indicator for the active chat.
    pub fn on_typing(&self, chat_id: ChatId, user: &UserRef, is_typing: bool) {
        self.inner.on_typing(chat_id, user, is_typing);
    }

    /// Note local keystrokes: sends `typing: true` once, then `typing: false`
    /// after `typing_idle` without another call.
    pub fn note_local_typing(&self) {
        let deadline = Instant::now() + self.inner.typing_idle;
        let chat_id = {
            let mut state = self.inner.state.lock();
            let Some(chat_id) = state.active else {
                return;
            };
            if state.local_typing.replace(deadline).is_some() {
                return;
            }
            chat_id
        };

        self.inner.connection.send(ClientFrame::Typing { chat_id, is_typing: true });
        tokio::spawn(typing_idle(
            Arc::downgrade(&self.inner),
            self.inner.tasks.child_token(),
        ));
    }

    /// Post a message. The view is populated by the realtime broadcast, not
    /// by this call; on failure nothing local changes.
    pub async fn send_message(&self, content: &str) -> Result<Message, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::InvalidInput("Message cannot be empty.".to_string()));
        }
        let chat_id = self
            .active_chat()
            .ok_or_else(|| ClientError::InvalidInput("No chat is open.".to_string()))?;

        self.inner.stop_local_typing();

        let request = NewMessage { content: content.to_string() };
        match self.inner.api.send_message(chat_id, &request).await {
            Ok(message) => Ok(message),
            Err(e) => {
                warn!(%chat_id, "send failed: {e}");
                self.inner.report(&e);
                Err(e)
            }
        }
    }

    /// Leave the room scope. Idempotent; also run on drop.
    ///
    /// Releases the connection if it is still bound to the chat this room
    /// last bound, or to the chat a pending `load` is connecting to. A left
    /// room cannot be loaded again.
    pub fn leave(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        self.inner.tasks.cancel();
        self.inner.stop_local_typing();

        let (active, bound) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            let active = state.active;
            state.reset(None);
            (active, state.bound.take())
        };
        let current = self.inner.connection.bound_chat();
        if current.is_some() && (current == bound || current == active) {
            self.inner.connection.disconnect();
        }
    }

    pub fn active_chat(&self) -> Option<ChatId> {
        self.inner.state.lock().active
    }

    pub fn chat(&self) -> Option<Chat> {
        self.inner.state.lock().chat.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().messages.clone()
    }

    /// Users currently typing, in the order they started.
    pub fn typing_users(&self) -> Vec<UserRef> {
        let now = Instant::now();
        self.inner
            .state
            .lock()
            .typing
            .values()
            .filter(|(_, expires)| *expires > now)
            .map(|(user, _)| user.clone())
            .collect()
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.leave();
    }
}

impl std::fmt::Debug for ChatRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ChatRoom")
            .field("active", &state.active)
            .field("messages", &state.messages.len())
            .field("typing", &state.typing.len())
            .finish()
    }
}

async fn sweeper(room: Weak<RoomInner>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(TYPING_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        match room.upgrade() {
            Some(room) => room.sweep_typing(),
            None => return,
        }
    }
}

/// Send `typing: false` once the local typing deadline passes unrefreshed.
async fn typing_idle(room: Weak<RoomInner>, cancel: CancellationToken) {
    loop {
        let Some(inner) = room.upgrade() else {
            return;
        };
        let Some(deadline) = inner.state.lock().local_typing else {
            return;
        };
        drop(inner);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let Some(room) = room.upgrade() else {
            return;
        };
        let expired = matches!(room.state.lock().local_typing, Some(d) if d <= Instant::now());
        if expired {
            room.stop_local_typing();
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

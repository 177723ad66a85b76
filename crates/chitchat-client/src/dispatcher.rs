//! Process-wide publish/subscribe registry.
//!
//! Decouples transport events from their consumers. One dispatcher is built
//! at the composition root and handed to everything that publishes or
//! subscribes; nothing reaches it through a global.
//!
//! ```text
//!   ConnectionManager ──publish──▶ EventDispatcher ──▶ ChatRoom handlers
//!   SessionStore      ──publish──▶   (per name,    ──▶ ChatDirectory handlers
//!                                  insertion order) ──▶ SessionStore (auth_rejected)
//! ```
//!
//! Dispatch is synchronous. The handler list for a name is snapshotted before
//! any handler runs and the registry lock is released, so handlers may
//! subscribe, unsubscribe, or publish re-entrantly. A panicking handler is
//! caught and logged; the remaining handlers still run.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::events::{ClientEvent, EventName};

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventName, Vec<(u64, Handler)>>,
}

impl Registry {
    fn remove(&mut self, name: EventName, id: u64) -> bool {
        let Some(list) = self.handlers.get_mut(&name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(&name);
        }
        removed
    }
}

/// Cloneable handle to a shared subscriber registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`. Handlers run in subscription order.
    ///
    /// The returned [`Subscription`] unsubscribes when dropped.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(name)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(event = %name, id, "subscribed");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            name,
            id,
            detached: false,
        }
    }

    /// Deliver `event` to every handler subscribed to its name.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, event: &ClientEvent) -> usize {
        let name = event.name();
        let snapshot: Vec<Handler> = {
            let registry = self.registry.lock();
            match registry.handlers.get(&name) {
                Some(list) => list.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for handler in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(event = %name, "event handler panicked: {}", panic_message(&*payload));
                }
            }
        }
        delivered
    }

    /// Number of live handlers for `name`.
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.registry
            .lock()
            .handlers
            .get(&name)
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        let total: usize = registry.handlers.values().map(Vec::len).sum();
        f.debug_struct("EventDispatcher").field("handlers", &total).finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Disposer for one handler registration.
///
/// `unsubscribe` is idempotent and safe to call from inside another handler.
/// Dropping the subscription unsubscribes, which ties a handler's lifetime
/// to the scope that owns it.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    name: EventName,
    id: u64,
    detached: bool,
}

impl Subscription {
    pub fn name(&self) -> EventName {
        self.name
    }

    /// Remove the handler. Returns `true` only the first time it takes effect.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.lock().remove(self.name, self.id);
        if removed {
            trace!(event = %self.name, id = self.id, "unsubscribed");
        }
        removed
    }

    /// Keep the handler registered for the rest of the dispatcher's life.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

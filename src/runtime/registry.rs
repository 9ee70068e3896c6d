//! Subscription registry: event kind to ordered handler lists.
//!
//! Handlers are identified by their `Arc`, so registering the same handler
//! twice is a no-op and `off` removes exactly the registration made with it.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, Weak},
};

use tracing::trace;

use crate::{
    Result, ShareLock,
    events::{EventKind, PushEvent},
    runtime::guarded,
};

pub type EventHandle = Arc<dyn Fn(&PushEvent) -> Result<()> + Send + Sync>;

/// Wraps a closure as an [`EventHandle`].
pub fn handler(f: impl Fn(&PushEvent) -> Result<()> + Send + Sync + 'static) -> EventHandle {
    Arc::new(f)
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: ShareLock<HashMap<EventKind, Vec<EventHandle>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Registers `handler` for `kind`. Returns false if it was already registered.
    pub fn on(
        &self,
        kind: EventKind,
        handler: EventHandle,
    ) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let list = handlers.entry(kind).or_default();
        if list.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        list.push(handler);
        true
    }

    /// Removes `handler` from `kind`. Returns false if it was not registered.
    pub fn off(
        &self,
        kind: EventKind,
        handler: &EventHandle,
    ) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !Arc::ptr_eq(h, handler));
        before != list.len()
    }

    /// Registers `handler` for as long as the returned guard lives.
    pub fn subscribe(
        self: &Arc<Self>,
        kind: EventKind,
        handler: EventHandle,
    ) -> Subscription {
        let active = self.on(kind, handler.clone());
        Subscription {
            registry: Arc::downgrade(self),
            kind,
            handler,
            active,
        }
    }

    /// Delivers `event` to the handlers of its kind, in registration order.
    ///
    /// Each handler runs isolated: an error or a panic is logged and the
    /// remaining handlers still run. Returns the number of handlers that succeeded.
    pub fn dispatch(
        &self,
        event: &PushEvent,
    ) -> usize {
        let handlers = self.handlers.read().unwrap().get(&event.kind).cloned().unwrap_or_default();
        trace!(kind = %event.kind, handlers = handlers.len(), "dispatching event");

        handlers.iter().filter(|handle| guarded(event.kind.as_ref(), || (handle)(event))).count()
    }

    pub fn handler_count(
        &self,
        kind: EventKind,
    ) -> usize {
        self.handlers.read().unwrap().get(&kind).map(Vec::len).unwrap_or(0)
    }
}

/// Scoped registration, released on drop.
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    kind: EventKind,
    handler: EventHandle,
    active: bool,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether this guard made the registration (false if the handler was already registered).
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.off(self.kind, &self.handler);
        }
    }
}

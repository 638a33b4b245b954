//! Publish/subscribe event bus.
//!
//! Subscriptions are keyed by event type. Sender-scoped handlers dispatch
//! before global ones for the same event. Handlers are removed from every
//! dispatch list before being destroyed, so `invoke` never runs after the
//! owning subscription is gone.

use keel_core::{EventData, NameHash};
use std::collections::HashMap;
use tracing::debug;

use crate::handler::EventHandler;

/// Non-owning identity of a subscribing object.
///
/// Compared by value only; the bus never dereferences it. If the object
/// behind the token goes away, its subscriptions must be removed with
/// `unsubscribe_receiver` before dispatch can reach them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

impl ReceiverId {
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        ReceiverId(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Non-owning identity of an event sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(u64);

impl SenderId {
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        SenderId(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Dispatches typed events to registered handlers.
#[derive(Default)]
pub struct EventBus {
    subscriptions: HashMap<NameHash, Vec<EventHandler>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files a handler under an event type. A handler built with
    /// `with_sender` only fires for events from that sender.
    pub fn subscribe(&mut self, event_type: NameHash, mut handler: EventHandler) {
        handler.set_event_type(event_type);
        self.subscriptions.entry(event_type).or_default().push(handler);
    }

    /// Publishes an event. Sender-scoped handlers fire first, then global
    /// ones, each in subscription order. Returns the number of handlers
    /// invoked.
    pub fn send(&self, sender: SenderId, event_type: NameHash, data: &mut EventData) -> usize {
        let Some(handlers) = self.subscriptions.get(&event_type) else {
            return 0;
        };
        let mut fired = 0;
        for handler in handlers.iter().filter(|h| h.sender() == Some(sender)) {
            handler.invoke(event_type, data);
            fired += 1;
        }
        for handler in handlers.iter().filter(|h| h.sender().is_none()) {
            handler.invoke(event_type, data);
            fired += 1;
        }
        fired
    }

    /// Clones out the handlers `send` would invoke, in dispatch order.
    ///
    /// Lets a caller holding an outer lock around the bus release it
    /// before dispatch, so handlers can re-enter the subscription API.
    /// Foreign handler clones go through the installed clone callback
    /// and release on drop, keeping the refcount discipline intact.
    #[must_use]
    pub fn collect_handlers(&self, sender: SenderId, event_type: NameHash) -> Vec<EventHandler> {
        let Some(handlers) = self.subscriptions.get(&event_type) else {
            return Vec::new();
        };
        let mut collected: Vec<EventHandler> = handlers
            .iter()
            .filter(|h| h.sender() == Some(sender))
            .cloned()
            .collect();
        collected.extend(handlers.iter().filter(|h| h.sender().is_none()).cloned());
        collected
    }

    /// Removes a receiver's handlers for one event type. Returns the
    /// number removed.
    pub fn unsubscribe(&mut self, receiver: ReceiverId, event_type: NameHash) -> usize {
        let Some(handlers) = self.subscriptions.get_mut(&event_type) else {
            return 0;
        };
        let before = handlers.len();
        handlers.retain(|h| h.receiver() != receiver);
        let removed = before - handlers.len();
        if handlers.is_empty() {
            self.subscriptions.remove(&event_type);
        }
        removed
    }

    /// Removes every handler belonging to a receiver, across all event
    /// types. Called before the receiving object is destroyed.
    pub fn unsubscribe_receiver(&mut self, receiver: ReceiverId) -> usize {
        let mut removed = 0;
        self.subscriptions.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|h| h.receiver() != receiver);
            removed += before - handlers.len();
            !handlers.is_empty()
        });
        if removed > 0 {
            debug!(receiver = receiver.value(), removed, "receiver unsubscribed");
        }
        removed
    }

    /// Number of handlers filed under an event type.
    pub fn handler_count(&self, event_type: NameHash) -> usize {
        self.subscriptions.get(&event_type).map_or(0, Vec::len)
    }

    pub fn is_subscribed(&self, receiver: ReceiverId, event_type: NameHash) -> bool {
        self.subscriptions
            .get(&event_type)
            .is_some_and(|handlers| handlers.iter().any(|h| h.receiver() == receiver))
    }
}

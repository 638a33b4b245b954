//! Polymorphic event handlers.
//!
//! The native/foreign distinction is a tagged variant behind a common
//! invoke/clone surface: native handlers hold a plain function pointer,
//! foreign handlers hold an entry point into another runtime plus the
//! owned handle keeping that runtime's closure alive.

use keel_core::{EventData, NameHash};

use crate::bus::{ReceiverId, SenderId};
use crate::handle::ForeignHandle;

/// Native callback signature: event type and mutable payload.
pub type NativeCallback = fn(NameHash, &mut EventData);

/// Foreign entry point signature: raw event-type hash and payload pointer.
/// The pointer is valid only for the duration of the call.
pub type ForeignEntryFn = unsafe extern "C" fn(u32, *mut EventData);

#[derive(Clone)]
enum Callback {
    Native(NativeCallback),
    Foreign {
        entry: ForeignEntryFn,
        handle: ForeignHandle,
    },
}

/// An event subscription's handler.
///
/// The receiver is a non-owning identity token: the handler never keeps
/// the receiving object alive, and the bus is responsible for removing a
/// handler before its receiver goes away. Only the foreign closure is
/// kept alive, through the owned handle.
#[derive(Clone)]
pub struct EventHandler {
    receiver: ReceiverId,
    sender: Option<SenderId>,
    event_type: Option<NameHash>,
    callback: Callback,
}

impl EventHandler {
    /// Creates a handler invoking a native function pointer.
    #[must_use]
    pub fn native(receiver: ReceiverId, callback: NativeCallback) -> Self {
        Self {
            receiver,
            sender: None,
            event_type: None,
            callback: Callback::Native(callback),
        }
    }

    /// Creates a handler invoking a foreign entry point. Takes ownership
    /// of the handle reference; it is released when the handler is dropped.
    #[must_use]
    pub fn foreign(receiver: ReceiverId, entry: ForeignEntryFn, handle: ForeignHandle) -> Self {
        Self {
            receiver,
            sender: None,
            event_type: None,
            callback: Callback::Foreign { entry, handle },
        }
    }

    /// Scopes the handler to events from one sender.
    #[must_use]
    pub fn with_sender(mut self, sender: SenderId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn receiver(&self) -> ReceiverId {
        self.receiver
    }

    pub fn sender(&self) -> Option<SenderId> {
        self.sender
    }

    pub fn event_type(&self) -> Option<NameHash> {
        self.event_type
    }

    /// Set by the bus when the handler is filed under an event type.
    pub(crate) fn set_event_type(&mut self, event_type: NameHash) {
        self.event_type = Some(event_type);
    }

    /// Forwards the event to the callback.
    pub fn invoke(&self, event_type: NameHash, data: &mut EventData) {
        match &self.callback {
            Callback::Native(callback) => callback(event_type, data),
            Callback::Foreign { entry, .. } => {
                // Payload pointer is only valid for the duration of the call.
                unsafe { entry(event_type.value(), data as *mut EventData) }
            }
        }
    }
}

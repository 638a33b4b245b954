//! Event bridge exports.
//!
//! Mirrors the engine-side subscription API for foreign-runtime bindings.
//! The foreign runtime installs its handle lifetime callbacks first, then
//! subscribes with an entry point plus an owned callback handle; the
//! engine keeps the foreign closure alive through the handle for as long
//! as the subscription exists, while the receiver itself is referenced by
//! identity only.

use crate::{
    lock_engine, KEEL_ERR_CALLBACKS_NOT_INSTALLED, KEEL_ERR_INVALID_ARGUMENT,
    KEEL_ERR_NOT_INITIALIZED, KEEL_ERR_NULL_POINTER, KEEL_OK,
};
use keel_core::{EventData, NameHash, Variant};
use keel_events::{
    install_handle_callbacks, CloneHandleFn, Error as EventError, EventBus, EventHandler,
    ForeignEntryFn, ForeignHandle, FreeHandleFn, ReceiverId, SenderId,
};
use libc::c_char;
use std::ffi::{c_void, CStr};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Takes a reference on the bus and releases the engine guard, so no
/// export holds the engine lock while the bus is used. Handlers invoked
/// during dispatch may re-enter any export.
fn engine_bus() -> Option<Arc<Mutex<EventBus>>> {
    lock_engine().as_ref().map(|engine| Arc::clone(&engine.bus))
}

/// Installs the foreign runtime's handle clone/free callbacks. Must be
/// called before the first subscription.
#[unsafe(no_mangle)]
pub extern "C" fn keel_install_handle_callbacks(
    clone: Option<CloneHandleFn>,
    free: Option<FreeHandleFn>,
) -> i32 {
    let (Some(clone), Some(free)) = (clone, free) else {
        return KEEL_ERR_NULL_POINTER;
    };
    install_handle_callbacks(clone, free);
    KEEL_OK
}

/// Subscribes `receiver` to an event type, globally when `sender` is zero
/// or scoped to one sender otherwise. Takes ownership of one reference on
/// `callback_handle`; it is released when the subscription is removed.
#[unsafe(no_mangle)]
pub extern "C" fn keel_subscribe_to_event(
    receiver: u64,
    sender: u64,
    event_type: u32,
    callback: Option<ForeignEntryFn>,
    callback_handle: *mut c_void,
) -> i32 {
    if receiver == 0 {
        return KEEL_ERR_INVALID_ARGUMENT;
    }
    let Some(callback) = callback else {
        return KEEL_ERR_NULL_POINTER;
    };
    let handle = match ForeignHandle::new(callback_handle) {
        Ok(handle) => handle,
        Err(EventError::NullHandle) => return KEEL_ERR_NULL_POINTER,
        Err(EventError::CallbacksNotInstalled) => return KEEL_ERR_CALLBACKS_NOT_INSTALLED,
    };

    let Some(bus) = engine_bus() else {
        return KEEL_ERR_NOT_INITIALIZED;
    };

    let mut handler = EventHandler::foreign(ReceiverId::from_raw(receiver), callback, handle);
    if sender != 0 {
        handler = handler.with_sender(SenderId::from_raw(sender));
    }
    bus.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .subscribe(NameHash::from_raw(event_type), handler);
    KEEL_OK
}

/// Removes every subscription belonging to `receiver`, releasing the
/// foreign handles those subscriptions owned. Returns the number removed.
#[unsafe(no_mangle)]
pub extern "C" fn keel_unsubscribe_receiver(receiver: u64) -> i32 {
    let Some(bus) = engine_bus() else {
        return KEEL_ERR_NOT_INITIALIZED;
    };
    let removed = bus
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .unsubscribe_receiver(ReceiverId::from_raw(receiver));
    removed as i32
}

/// Publishes an event with a JSON object payload (null for an empty
/// payload). Returns the number of handlers invoked.
///
/// # Safety
/// `payload_json` must be null or a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn keel_send_event(
    sender: u64,
    event_type: u32,
    payload_json: *const c_char,
) -> i32 {
    let mut data = EventData::new();
    if !payload_json.is_null() {
        let json = match unsafe { CStr::from_ptr(payload_json) }.to_str() {
            Ok(json) => json,
            Err(_) => return KEEL_ERR_INVALID_ARGUMENT,
        };
        match serde_json::from_str::<serde_json::Value>(json) {
            Ok(serde_json::Value::Object(map)) => {
                for (key, value) in map {
                    match variant_from_json(&value) {
                        Some(variant) => {
                            data.set(key.as_str(), variant);
                        }
                        None => warn!(key = %key, "skipping non-scalar payload value"),
                    }
                }
            }
            Ok(_) | Err(_) => return KEEL_ERR_INVALID_ARGUMENT,
        }
    }

    let Some(bus) = engine_bus() else {
        return KEEL_ERR_NOT_INITIALIZED;
    };
    let event_type = NameHash::from_raw(event_type);
    // Clone the matching handlers out and release the bus before
    // dispatch: a handler may publish or subscribe from inside its own
    // invocation, and the bus mutex is not reentrant.
    let handlers = bus
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .collect_handlers(SenderId::from_raw(sender), event_type);
    for handler in &handlers {
        handler.invoke(event_type, &mut data);
    }
    handlers.len() as i32
}

fn variant_from_json(value: &serde_json::Value) -> Option<Variant> {
    match value {
        serde_json::Value::Null => Some(Variant::Empty),
        serde_json::Value::Bool(v) => Some(Variant::Bool(*v)),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                if let Ok(v) = i32::try_from(v) {
                    Some(Variant::Int(v))
                } else {
                    Some(Variant::Int64(v))
                }
            } else {
                n.as_f64().map(Variant::Double)
            }
        }
        serde_json::Value::String(v) => Some(Variant::String(v.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{keel_initialize, keel_shutdown};
    use serial_test::serial;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    static CLONES: AtomicUsize = AtomicUsize::new(0);
    static FREES: AtomicUsize = AtomicUsize::new(0);
    static HITS: AtomicUsize = AtomicUsize::new(0);
    static LAST_EVENT: AtomicUsize = AtomicUsize::new(0);
    static LAST_FRAME: AtomicI64 = AtomicI64::new(0);

    unsafe extern "C" fn clone_cb(raw: *mut c_void) -> *mut c_void {
        CLONES.fetch_add(1, Ordering::SeqCst);
        raw
    }

    unsafe extern "C" fn free_cb(_raw: *mut c_void) {
        FREES.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn entry(event_type: u32, data: *mut EventData) {
        HITS.fetch_add(1, Ordering::SeqCst);
        LAST_EVENT.store(event_type as usize, Ordering::SeqCst);
        let data = unsafe { &mut *data };
        if let Some(frame) = data.get("Frame").and_then(|v| v.as_int()) {
            LAST_FRAME.store(frame, Ordering::SeqCst);
        }
    }

    fn reset() {
        let _ = keel_shutdown();
        assert_eq!(keel_initialize(), KEEL_OK);
        assert_eq!(keel_install_handle_callbacks(Some(clone_cb), Some(free_cb)), KEEL_OK);
        CLONES.store(0, Ordering::SeqCst);
        FREES.store(0, Ordering::SeqCst);
        HITS.store(0, Ordering::SeqCst);
    }

    fn handle() -> *mut c_void {
        0x2000 as *mut c_void
    }

    #[test]
    #[serial]
    fn subscribe_publish_unsubscribe() {
        reset();
        let event = NameHash::new("LevelLoaded").value();

        assert_eq!(
            keel_subscribe_to_event(7, 0, event, Some(entry), handle()),
            KEEL_OK
        );

        let payload = CString::new(r#"{"Frame": 42, "Name": "intro"}"#).unwrap();
        let fired = unsafe { keel_send_event(99, event, payload.as_ptr()) };
        assert_eq!(fired, 1);
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
        assert_eq!(LAST_EVENT.load(Ordering::SeqCst), event as usize);
        assert_eq!(LAST_FRAME.load(Ordering::SeqCst), 42);

        // Per-dispatch clones are balanced by their drops; removal
        // releases exactly the one original reference on top
        assert_eq!(keel_unsubscribe_receiver(7), 1);
        assert_eq!(
            FREES.load(Ordering::SeqCst),
            CLONES.load(Ordering::SeqCst) + 1
        );

        let fired = unsafe { keel_send_event(99, event, std::ptr::null()) };
        assert_eq!(fired, 0);

        assert_eq!(keel_shutdown(), KEEL_OK);
    }

    #[test]
    #[serial]
    fn sender_scoped_subscription_over_ffi() {
        reset();
        let event = NameHash::new("Collision").value();

        assert_eq!(
            keel_subscribe_to_event(7, 500, event, Some(entry), handle()),
            KEEL_OK
        );

        assert_eq!(unsafe { keel_send_event(123, event, std::ptr::null()) }, 0);
        assert_eq!(unsafe { keel_send_event(500, event, std::ptr::null()) }, 1);

        assert_eq!(keel_shutdown(), KEEL_OK);
    }

    unsafe extern "C" fn chaining_entry(_event_type: u32, _data: *mut EventData) {
        // Publish a follow-up event from inside our own invocation
        let follow = NameHash::new("FollowUp").value();
        let fired = unsafe { keel_send_event(0, follow, std::ptr::null()) };
        LAST_FRAME.store(fired as i64, Ordering::SeqCst);
    }

    #[test]
    #[serial]
    fn handler_can_publish_from_inside_dispatch() {
        reset();
        let trigger = NameHash::new("Trigger").value();
        let follow = NameHash::new("FollowUp").value();

        assert_eq!(
            keel_subscribe_to_event(7, 0, trigger, Some(chaining_entry), handle()),
            KEEL_OK
        );
        assert_eq!(
            keel_subscribe_to_event(8, 0, follow, Some(entry), handle()),
            KEEL_OK
        );

        let fired = unsafe { keel_send_event(1, trigger, std::ptr::null()) };
        assert_eq!(fired, 1);
        // The nested publish reached the follow-up handler and reported it
        assert_eq!(LAST_FRAME.load(Ordering::SeqCst), 1);
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
        assert_eq!(LAST_EVENT.load(Ordering::SeqCst), follow as usize);

        assert_eq!(keel_unsubscribe_receiver(7), 1);
        assert_eq!(keel_unsubscribe_receiver(8), 1);
        assert_eq!(keel_shutdown(), KEEL_OK);
    }

    unsafe extern "C" fn subscribing_entry(_event_type: u32, _data: *mut EventData) {
        HITS.fetch_add(1, Ordering::SeqCst);
        let late = NameHash::new("LateJoin").value();
        let status = keel_subscribe_to_event(9, 0, late, Some(entry), handle());
        LAST_FRAME.store(i64::from(status), Ordering::SeqCst);
    }

    #[test]
    #[serial]
    fn handler_can_subscribe_from_inside_dispatch() {
        reset();
        let trigger = NameHash::new("Trigger").value();

        assert_eq!(
            keel_subscribe_to_event(7, 0, trigger, Some(subscribing_entry), handle()),
            KEEL_OK
        );
        assert_eq!(unsafe { keel_send_event(1, trigger, std::ptr::null()) }, 1);
        assert_eq!(LAST_FRAME.load(Ordering::SeqCst), i64::from(KEEL_OK));

        assert_eq!(keel_unsubscribe_receiver(7), 1);
        assert_eq!(keel_unsubscribe_receiver(9), 1);
        assert_eq!(keel_shutdown(), KEEL_OK);
    }

    #[test]
    #[serial]
    fn invalid_arguments_rejected() {
        reset();

        assert_eq!(
            keel_subscribe_to_event(0, 0, 1, Some(entry), handle()),
            KEEL_ERR_INVALID_ARGUMENT
        );
        assert_eq!(
            keel_subscribe_to_event(7, 0, 1, None, handle()),
            KEEL_ERR_NULL_POINTER
        );
        assert_eq!(
            keel_subscribe_to_event(7, 0, 1, Some(entry), std::ptr::null_mut()),
            KEEL_ERR_NULL_POINTER
        );

        let bad = CString::new("[1, 2]").unwrap();
        assert_eq!(
            unsafe { keel_send_event(1, 1, bad.as_ptr()) },
            KEEL_ERR_INVALID_ARGUMENT
        );

        assert_eq!(keel_shutdown(), KEEL_OK);
    }

    #[test]
    #[serial]
    fn uninitialized_engine_rejected() {
        let _ = keel_shutdown();
        assert_eq!(keel_install_handle_callbacks(Some(clone_cb), Some(free_cb)), KEEL_OK);
        assert_eq!(
            keel_subscribe_to_event(7, 0, 1, Some(entry), handle()),
            KEEL_ERR_NOT_INITIALIZED
        );
        assert_eq!(keel_unsubscribe_receiver(7), KEEL_ERR_NOT_INITIALIZED);
    }
}

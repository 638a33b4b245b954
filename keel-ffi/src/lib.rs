//! C ABI exports for embedding Keel in a foreign host runtime.
//!
//! The foreign host initializes the engine once, wires its handle
//! lifetime callbacks, then subscribes to and publishes events through
//! the exports in [`event`]. All exports return `0` on success and a
//! negative status on failure; functions returning strings hand out
//! ownership, released through `keel_free_string`.

mod event;

pub use event::*;

use keel_core::Context;
use keel_events::EventBus;
use keel_plugin::ReloadSlot;
use libc::c_char;
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

pub const KEEL_OK: i32 = 0;
pub const KEEL_ERR_NOT_INITIALIZED: i32 = -1;
pub const KEEL_ERR_ALREADY_INITIALIZED: i32 = -2;
pub const KEEL_ERR_NULL_POINTER: i32 = -3;
pub const KEEL_ERR_INVALID_ARGUMENT: i32 = -4;
pub const KEEL_ERR_CALLBACKS_NOT_INSTALLED: i32 = -5;

pub(crate) struct EngineHandle {
    pub(crate) context: Arc<Context>,
    pub(crate) bus: Arc<Mutex<EventBus>>,
    /// The per-plugin slot handed to the reload runtime. Boxed so its
    /// address stays stable for the lifetime of the engine.
    pub(crate) slot: Box<ReloadSlot>,
}

static ENGINE: Mutex<Option<EngineHandle>> = Mutex::new(None);

pub(crate) fn lock_engine() -> MutexGuard<'static, Option<EngineHandle>> {
    ENGINE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates the global engine handle: shared context, event bus, and a
/// reload slot primed with the context.
#[unsafe(no_mangle)]
pub extern "C" fn keel_initialize() -> i32 {
    let mut engine = lock_engine();
    if engine.is_some() {
        return KEEL_ERR_ALREADY_INITIALIZED;
    }
    let context = Context::new();
    *engine = Some(EngineHandle {
        context: Arc::clone(&context),
        bus: Arc::new(Mutex::new(EventBus::new())),
        slot: Box::new(ReloadSlot::with_context(context)),
    });
    info!("keel runtime initialized");
    KEEL_OK
}

/// Destroys the global engine handle. Remaining subscriptions release
/// their foreign handles as the bus drops.
#[unsafe(no_mangle)]
pub extern "C" fn keel_shutdown() -> i32 {
    let mut engine = lock_engine();
    if engine.take().is_none() {
        return KEEL_ERR_NOT_INITIALIZED;
    }
    info!("keel runtime shut down");
    KEEL_OK
}

/// The reload runtime's per-plugin slot, to be passed to each plugin's
/// `keel_plugin_main`. Valid until `keel_shutdown`.
#[unsafe(no_mangle)]
pub extern "C" fn keel_reload_slot() -> *mut ReloadSlot {
    let mut engine = lock_engine();
    match engine.as_mut() {
        Some(handle) => &mut *handle.slot as *mut ReloadSlot,
        None => std::ptr::null_mut(),
    }
}

/// Installs a `tracing` subscriber reading the `KEEL_LOG` environment
/// variable. Calling more than once is harmless.
#[unsafe(no_mangle)]
pub extern "C" fn keel_init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KEEL_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Releases a string previously returned by this API.
///
/// # Safety
/// `ptr` must be a pointer returned by a `keel_*` export, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn keel_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

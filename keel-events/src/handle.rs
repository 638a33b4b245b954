//! Foreign callback handle lifetime management.
//!
//! A foreign runtime (e.g. a managed language binding) pins its callback
//! closures behind opaque reference-counted handles. The runtime installs
//! a clone and a free callback once at startup; after that the bridge
//! clones a handle whenever a handler is duplicated and releases exactly
//! one reference when a handler is destroyed. The bridge never allocates
//! or frees foreign memory by any other path.

use std::ffi::c_void;
use std::sync::{Mutex, PoisonError};
use tracing::error;

use crate::{Error, Result};

/// Clones a foreign handle, incrementing its refcount. Returns the new handle.
pub type CloneHandleFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// Releases one reference on a foreign handle.
pub type FreeHandleFn = unsafe extern "C" fn(*mut c_void);

#[derive(Clone, Copy)]
struct HandleCallbacks {
    clone: CloneHandleFn,
    free: FreeHandleFn,
}

static CALLBACKS: Mutex<Option<HandleCallbacks>> = Mutex::new(None);

/// Installs the foreign runtime's handle lifetime callbacks.
///
/// Must be called before any cross-boundary subscription is created.
/// Reinstalling replaces the previous pair.
pub fn install_handle_callbacks(clone: CloneHandleFn, free: FreeHandleFn) {
    *CALLBACKS.lock().unwrap_or_else(PoisonError::into_inner) =
        Some(HandleCallbacks { clone, free });
}

fn callbacks() -> Option<HandleCallbacks> {
    *CALLBACKS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned reference to a closure living in a foreign runtime.
///
/// Holds exactly one reference: cloning goes through the installed clone
/// callback, dropping releases through the free callback and nulls the
/// raw pointer so a second release is inert.
#[derive(Debug)]
pub struct ForeignHandle {
    raw: *mut c_void,
}

// The handle is an opaque token minted by the foreign runtime; the
// installed callbacks are required to accept it from any thread.
unsafe impl Send for ForeignHandle {}

impl ForeignHandle {
    /// Takes ownership of one reference on `raw`.
    ///
    /// Fails if the lifetime callbacks have not been installed yet, so a
    /// handle can never exist without a release path.
    pub fn new(raw: *mut c_void) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::NullHandle);
        }
        if callbacks().is_none() {
            return Err(Error::CallbacksNotInstalled);
        }
        Ok(Self { raw })
    }

    /// The raw handle value. Valid until this `ForeignHandle` is released.
    #[must_use]
    pub fn raw(&self) -> *mut c_void {
        self.raw
    }

    /// Releases the held reference. Safe to call more than once; only the
    /// first call reaches the foreign runtime.
    pub fn release(&mut self) {
        if self.raw.is_null() {
            return;
        }
        match callbacks() {
            Some(cbs) => unsafe { (cbs.free)(self.raw) },
            None => error!("foreign handle leaked: free callback no longer installed"),
        }
        self.raw = std::ptr::null_mut();
    }
}

impl Clone for ForeignHandle {
    fn clone(&self) -> Self {
        if self.raw.is_null() {
            return Self { raw: std::ptr::null_mut() };
        }
        match callbacks() {
            Some(cbs) => Self {
                raw: unsafe { (cbs.clone)(self.raw) },
            },
            None => {
                error!("cloning foreign handle without installed callbacks; handle degraded to empty");
                Self { raw: std::ptr::null_mut() }
            }
        }
    }
}

impl Drop for ForeignHandle {
    fn drop(&mut self) {
        self.release();
    }
}

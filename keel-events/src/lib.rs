//! Event dispatch for Keel, including the cross-runtime bridge.
//!
//! Handlers come in two variants: native (a plain function pointer) and
//! foreign (an entry point into another runtime plus a reference-counted
//! handle that keeps the foreign closure alive). Cloning a handler clones
//! the handle; dropping one releases exactly one reference. The bus
//! guarantees handlers are removed from every dispatch list before they
//! are destroyed.

mod bus;
mod handle;
mod handler;

pub use bus::{EventBus, ReceiverId, SenderId};
pub use handle::{install_handle_callbacks, CloneHandleFn, ForeignHandle, FreeHandleFn};
pub use handler::{EventHandler, ForeignEntryFn, NativeCallback};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("foreign handle callbacks not installed")]
    CallbacksNotInstalled,

    #[error("null foreign callback handle")]
    NullHandle,
}

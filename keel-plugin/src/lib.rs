//! Native plugin lifecycle host for Keel.
//!
//! A plugin is a dynamically loadable unit of native code that registers
//! object types and subsystems with the shared `Context`. The host owns
//! the lifecycle (load, start, step, stop, unload, reload) and keeps a
//! ledger of everything a plugin registered so unload can always retract
//! it, whether or not the plugin author cleaned up manually.
//!
//! Hot reload swaps a plugin's code while engine state persists: the
//! shared context is carried across the swap through the reload slot's
//! opaque userdata, and the incoming image replays its registrations on
//! load.

mod app;
mod error;
mod reload;

pub use app::{LifecycleState, LoadedPlugin, PluginApp, PluginEnv, PluginHost};
pub use error::PluginError;
pub use reload::{
    plugin_main, ReloadSlot, Userdata, OP_CLOSE, OP_LOAD, OP_STEP, OP_UNLOAD, STATUS_OK,
    STATUS_UNSUPPORTED,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, PluginError>;

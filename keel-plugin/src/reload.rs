//! Reload ABI entry point.
//!
//! The reload-management runtime drives a single exported function with an
//! operation code. The protocol is a fixed dispatch table over four
//! operations; the opaque userdata slot alternates between the bare shared
//! context (between plugin instances) and the live plugin instance (while
//! one is resident). Because the host, not the module, owns the context,
//! a module can be swapped while surrounding engine state persists.

use keel_core::Context;
use std::sync::Arc;

use crate::app::{LoadedPlugin, PluginApp};
#[cfg(feature = "hot-reload")]
use crate::app::PluginEnv;

/// Construct the plugin instance on load.
pub const OP_LOAD: i32 = 0;
/// Per-tick hook while the plugin is resident.
pub const OP_STEP: i32 = 1;
/// Tear the instance down ahead of a reload.
pub const OP_UNLOAD: i32 = 2;
/// Tear the instance down for good.
pub const OP_CLOSE: i32 = 3;

pub const STATUS_OK: i32 = 0;
/// Unsupported or unrecognized operation.
pub const STATUS_UNSUPPORTED: i32 = -3;

/// What the reload slot's userdata currently holds.
pub enum Userdata {
    /// The bare engine context, ready to be handed to a plugin instance.
    Context(Arc<Context>),
    /// A resident plugin instance. Carries the context inside it.
    Instance(Box<LoadedPlugin>),
}

/// The module-side view of the reload runtime's per-plugin slot.
#[derive(Default)]
pub struct ReloadSlot {
    pub userdata: Option<Userdata>,
}

impl ReloadSlot {
    /// A slot primed with the shared context, as the host sets it up
    /// before the first load.
    #[must_use]
    pub fn with_context(context: Arc<Context>) -> Self {
        Self {
            userdata: Some(Userdata::Context(context)),
        }
    }
}

/// Reports every operation as unsupported; this build has no hot-reload
/// support. Never touches the slot.
#[cfg(not(feature = "hot-reload"))]
pub fn plugin_main<F>(_slot: &mut ReloadSlot, operation: i32, _factory: F) -> i32
where
    F: FnOnce(Arc<Context>) -> Box<dyn PluginApp>,
{
    tracing::warn!(operation, "hot reload not supported in this build");
    STATUS_UNSUPPORTED
}

/// Dispatches one reload operation against the slot.
///
/// Load constructs the plugin via `factory` and drives its `load`
/// callback; unload and close drive `unload`, retract every recorded
/// registration, and put the bare context back in the slot. Returns `0`
/// on success, negative on unsupported operations. Unrecognized codes
/// are a protocol violation: fatal in debug builds, rejected without
/// touching the slot otherwise.
#[cfg(feature = "hot-reload")]
pub fn plugin_main<F>(slot: &mut ReloadSlot, operation: i32, factory: F) -> i32
where
    F: FnOnce(Arc<Context>) -> Box<dyn PluginApp>,
{
    match operation {
        OP_LOAD => match slot.userdata.take() {
            Some(Userdata::Context(context)) => {
                let app = factory(Arc::clone(&context));
                let mut plugin = LoadedPlugin::new(app, PluginEnv::new(context));
                plugin.load();
                slot.userdata = Some(Userdata::Instance(Box::new(plugin)));
                STATUS_OK
            }
            other => {
                // Load against a slot that doesn't hold a bare context
                slot.userdata = other;
                debug_assert!(false, "reload slot holds no context on load");
                STATUS_UNSUPPORTED
            }
        },
        OP_UNLOAD | OP_CLOSE => match slot.userdata.take() {
            Some(Userdata::Instance(mut plugin)) => {
                plugin.unload();
                let context = plugin.context();
                drop(plugin); // environment drop retracts recorded registrations
                slot.userdata = Some(Userdata::Context(context));
                STATUS_OK
            }
            other => {
                slot.userdata = other;
                debug_assert!(false, "reload slot holds no instance on unload");
                STATUS_UNSUPPORTED
            }
        },
        OP_STEP => STATUS_OK,
        _ => {
            debug_assert!(false, "unrecognized plugin operation code {operation}");
            STATUS_UNSUPPORTED
        }
    }
}

/// Defines the stable-name reload entry point for a plugin crate.
///
/// The plugin type must provide `fn new(context: Arc<Context>) -> Self`
/// and implement [`PluginApp`]. Expands to an exported
/// `keel_plugin_main(slot, operation)` with the reload runtime's
/// calling convention.
#[macro_export]
macro_rules! define_plugin_main {
    ($plugin_ty:ty) => {
        /// # Safety
        /// `slot` must point to the reload runtime's valid per-plugin slot.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn keel_plugin_main(
            slot: *mut $crate::ReloadSlot,
            operation: i32,
        ) -> i32 {
            if slot.is_null() {
                return $crate::STATUS_UNSUPPORTED;
            }
            let slot = unsafe { &mut *slot };
            $crate::plugin_main(slot, operation, |context| {
                Box::new(<$plugin_ty>::new(context)) as Box<dyn $crate::PluginApp>
            })
        }
    };
}

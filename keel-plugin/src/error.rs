//! Error types for the plugin host.

use crate::LifecycleState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("no plugin loaded")]
    NotLoaded,

    #[error("cannot {operation} while plugin is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("registry error: {0}")]
    Registry(#[from] keel_core::Error),
}

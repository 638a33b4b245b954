//! Shared engine services for Keel.
//!
//! This crate defines the fundamental, plugin-agnostic pieces used by the
//! plugin host and the event bridge:
//! - `NameHash` identifiers for types, events, and subsystems
//! - The `Variant` value model and ordered `EventData` payload map
//! - The `Context` type/factory registry
//! - The mutex-guarded scratch buffer pool
//!
//! Domain-specific object types belong in plugins, not here.

mod context;
mod hash;
mod scratch;
mod variant;

pub use context::{AttributeInfo, Context, Object, TypeInfo};
pub use hash::NameHash;
pub use scratch::{ScratchBuffer, ScratchBufferPool};
pub use variant::{EventData, Variant};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("factory already registered for type {0}")]
    FactoryAlreadyRegistered(NameHash),

    #[error("no factory registered for type {0}")]
    FactoryNotFound(NameHash),
}

//! 32-bit name hashing.
//!
//! Types, events, and subsystems are identified by a case-sensitive SDBM
//! hash of their name. Hashing is a `const fn` so event and type constants
//! can be computed at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hashed identifier for a type, event, or subsystem name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameHash(u32);

impl NameHash {
    /// The zero hash, used as an "unset" sentinel.
    pub const ZERO: NameHash = NameHash(0);

    /// Hashes a name at compile time or runtime.
    #[must_use]
    pub const fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0;
        let mut i = 0;
        while i < bytes.len() {
            // SDBM: hash(i) = c + (hash(i-1) << 6) + (hash(i-1) << 16) - hash(i-1)
            hash = (bytes[i] as u32)
                .wrapping_add(hash << 6)
                .wrapping_add(hash << 16)
                .wrapping_sub(hash);
            i += 1;
        }
        NameHash(hash)
    }

    /// Wraps a raw 32-bit hash value (e.g. one received over FFI).
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        NameHash(value)
    }

    /// Returns the raw 32-bit hash value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<&str> for NameHash {
    fn from(name: &str) -> Self {
        NameHash::new(name)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

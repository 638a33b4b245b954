//! The `Variant` value model and event payload map.
//!
//! Event payloads are ordered mappings from hashed parameter names to
//! variant values. Insertion order is preserved so a payload reads back
//! in the order the publisher built it.

use crate::NameHash;
use serde::{Deserialize, Serialize};

/// A dynamically typed value carried in event payloads and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Variant {
    Empty,
    Bool(bool),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Buffer(Vec<u8>),
}

impl Variant {
    /// Returns the boolean value, or `None` for other variants.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `i64`, widening `Int` if needed.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(i64::from(*v)),
            Variant::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `f64`, widening `Float` if needed.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Variant::Float(v) => Some(f64::from(*v)),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value, or `None` for other variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

/// Ordered mapping of hashed parameter names to variant values.
///
/// Lookups are linear; payloads are small (a handful of parameters) and
/// dispatch iterates them in publication order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    entries: Vec<(NameHash, Variant)>,
}

impl EventData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any existing value under the same name.
    /// A replaced parameter keeps its original position.
    pub fn set(&mut self, name: impl Into<NameHash>, value: impl Into<Variant>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: impl Into<NameHash>) -> Option<&Variant> {
        let name = name.into();
        self.entries.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: impl Into<NameHash>) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NameHash, &Variant)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_and_get() {
        let mut data = EventData::new();
        data.set("Frame", 42).set("Paused", false);
        assert_eq!(data.get("Frame"), Some(&Variant::Int(42)));
        assert_eq!(data.get("Paused"), Some(&Variant::Bool(false)));
        assert_eq!(data.get("Missing"), None);
    }

    #[test]
    fn replace_keeps_position() {
        let mut data = EventData::new();
        data.set("A", 1).set("B", 2).set("A", 3);
        let order: Vec<NameHash> = data.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec![NameHash::new("A"), NameHash::new("B")]);
        assert_eq!(data.get("A"), Some(&Variant::Int(3)));
    }

    #[test]
    fn preserves_insertion_order() {
        let mut data = EventData::new();
        data.set("Z", 1).set("A", 2).set("M", 3);
        let order: Vec<NameHash> = data.iter().map(|(k, _)| k).collect();
        assert_eq!(
            order,
            vec![NameHash::new("Z"), NameHash::new("A"), NameHash::new("M")]
        );
    }

    #[test]
    fn variant_widening_accessors() {
        assert_eq!(Variant::Int(7).as_int(), Some(7));
        assert_eq!(Variant::Int64(1 << 40).as_int(), Some(1 << 40));
        assert_eq!(Variant::Float(0.5).as_double(), Some(0.5));
        assert_eq!(Variant::Bool(true).as_int(), None);
    }

    #[test]
    fn serde_round_trip() {
        let mut data = EventData::new();
        data.set("Text", "hello").set("Count", 3);
        let json = serde_json::to_string(&data).unwrap();
        let back: EventData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}

//! The shared type/factory registry.
//!
//! `Context` is process-wide state with explicit startup and shutdown
//! boundaries. It is passed as an explicit `Arc<Context>` through every
//! call rather than accessed as an implicit singleton, so retraction
//! logic in the plugin host stays testable in isolation.
//!
//! Interior locking makes every operation take `&self`; callers are still
//! expected to serialize lifecycle-mutating sequences on one owner thread.

use crate::{Error, EventData, NameHash, Result, Variant};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// An engine object constructed through a registered factory.
pub trait Object: Any + Send + Sync {
    /// Hashed type identifier, matching `TypeInfo::type_hash_static`.
    fn type_hash(&self) -> NameHash;
    /// Human-readable type name.
    fn type_name(&self) -> &'static str;
    /// Applies a loaded attribute value. Default implementation ignores it.
    fn set_attribute(&mut self, _name: NameHash, _value: &Variant) {}
}

/// Static type identity for registrable object types.
pub trait TypeInfo {
    fn type_hash_static() -> NameHash;
    fn type_name_static() -> &'static str;
}

struct FactoryEntry {
    type_name: String,
    category: Option<String>,
    construct: Box<dyn Fn() -> Box<dyn Object> + Send + Sync>,
}

/// A reflected attribute default recorded for a type.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name: NameHash,
    pub default: Variant,
}

#[derive(Default)]
struct Registry {
    factories: HashMap<NameHash, FactoryEntry>,
    categories: HashMap<String, Vec<NameHash>>,
    subsystems: HashMap<NameHash, Arc<dyn Object>>,
    attributes: HashMap<NameHash, Vec<AttributeInfo>>,
}

/// The shared type/factory registry.
#[derive(Default)]
pub struct Context {
    registry: RwLock<Registry>,
    global_data: RwLock<EventData>,
}

impl Context {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a factory for `T`, optionally under a category.
    pub fn register_factory<T>(&self, category: Option<&str>) -> Result<()>
    where
        T: Object + TypeInfo + Default + 'static,
    {
        self.register_factory_with(
            T::type_hash_static(),
            T::type_name_static(),
            category,
            || Box::new(T::default()),
        )
    }

    /// Registers a factory under an explicit hash and name. This is the
    /// non-generic path used by bindings that mint types at runtime.
    pub fn register_factory_with<F>(
        &self,
        type_hash: NameHash,
        type_name: impl Into<String>,
        category: Option<&str>,
        construct: F,
    ) -> Result<()>
    where
        F: Fn() -> Box<dyn Object> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        let mut registry = self.write();
        if registry.factories.contains_key(&type_hash) {
            return Err(Error::FactoryAlreadyRegistered(type_hash));
        }
        debug!(type_name = %type_name, ?category, "factory registered");
        registry.factories.insert(
            type_hash,
            FactoryEntry {
                type_name,
                category: category.map(str::to_string),
                construct: Box::new(construct),
            },
        );
        if let Some(category) = category {
            registry
                .categories
                .entry(category.to_string())
                .or_default()
                .push(type_hash);
        }
        Ok(())
    }

    /// Removes the factory for a type, detaching it from its category list.
    ///
    /// Removing an unregistered type is a no-op so retraction stays
    /// idempotent across unload paths.
    pub fn remove_factory(&self, type_hash: NameHash, category: Option<&str>) {
        let mut registry = self.write();
        if let Some(entry) = registry.factories.remove(&type_hash) {
            debug!(type_name = %entry.type_name, "factory removed");
        }
        if let Some(category) = category {
            if let Some(types) = registry.categories.get_mut(category) {
                types.retain(|t| *t != type_hash);
                if types.is_empty() {
                    registry.categories.remove(category);
                }
            }
        }
    }

    /// Constructs an object of the given type through its factory.
    pub fn create_object(&self, type_hash: NameHash) -> Result<Box<dyn Object>> {
        let registry = self.read();
        let entry = registry
            .factories
            .get(&type_hash)
            .ok_or(Error::FactoryNotFound(type_hash))?;
        Ok((entry.construct)())
    }

    /// Returns true if a factory is registered for the type.
    pub fn is_factory_registered(&self, type_hash: NameHash) -> bool {
        self.read().factories.contains_key(&type_hash)
    }

    /// Types registered under a category, in registration order.
    pub fn types_in_category(&self, category: &str) -> Vec<NameHash> {
        self.read()
            .categories
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    /// Records a reflected attribute default for a type.
    pub fn register_attribute(&self, type_hash: NameHash, name: &str, default: Variant) {
        self.write()
            .attributes
            .entry(type_hash)
            .or_default()
            .push(AttributeInfo {
                name: NameHash::new(name),
                default,
            });
    }

    /// Drops every attribute recorded for a type.
    pub fn remove_all_attributes(&self, type_hash: NameHash) {
        self.write().attributes.remove(&type_hash);
    }

    /// Attributes recorded for a type, in registration order.
    pub fn attributes(&self, type_hash: NameHash) -> Vec<AttributeInfo> {
        self.read()
            .attributes
            .get(&type_hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Registers a subsystem instance under its type hash.
    pub fn register_subsystem(&self, subsystem: Arc<dyn Object>) {
        let hash = subsystem.type_hash();
        self.write().subsystems.insert(hash, subsystem);
    }

    /// Looks up a subsystem by type hash.
    pub fn subsystem(&self, type_hash: NameHash) -> Option<Arc<dyn Object>> {
        self.read().subsystems.get(&type_hash).cloned()
    }

    /// Removes a subsystem. Missing subsystems are ignored, matching
    /// `remove_factory` retraction semantics.
    pub fn remove_subsystem(&self, type_hash: NameHash) {
        self.write().subsystems.remove(&type_hash);
    }

    /// Shared scratch values surviving across plugin reloads.
    /// This is the engine-owned state a swapped module finds again on load.
    pub fn set_global(&self, name: impl Into<NameHash>, value: impl Into<Variant>) {
        self.global_data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(name, value);
    }

    pub fn global(&self, name: impl Into<NameHash>) -> Option<Variant> {
        self.global_data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Lamp;

    impl Object for Lamp {
        fn type_hash(&self) -> NameHash {
            Self::type_hash_static()
        }
        fn type_name(&self) -> &'static str {
            Self::type_name_static()
        }
    }

    impl TypeInfo for Lamp {
        fn type_hash_static() -> NameHash {
            NameHash::new("Lamp")
        }
        fn type_name_static() -> &'static str {
            "Lamp"
        }
    }

    #[test]
    fn register_create_remove() {
        let context = Context::new();
        context.register_factory::<Lamp>(None).unwrap();
        assert!(context.is_factory_registered(Lamp::type_hash_static()));

        let object = context.create_object(Lamp::type_hash_static()).unwrap();
        assert_eq!(object.type_name(), "Lamp");

        context.remove_factory(Lamp::type_hash_static(), None);
        assert!(!context.is_factory_registered(Lamp::type_hash_static()));
        assert!(context.create_object(Lamp::type_hash_static()).is_err());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let context = Context::new();
        context.register_factory::<Lamp>(None).unwrap();
        assert!(matches!(
            context.register_factory::<Lamp>(None),
            Err(Error::FactoryAlreadyRegistered(_))
        ));
    }

    #[test]
    fn category_tracking() {
        let context = Context::new();
        context.register_factory::<Lamp>(Some("Scene")).unwrap();
        assert_eq!(
            context.types_in_category("Scene"),
            vec![Lamp::type_hash_static()]
        );

        context.remove_factory(Lamp::type_hash_static(), Some("Scene"));
        assert!(context.types_in_category("Scene").is_empty());
    }

    #[test]
    fn attributes_removed_wholesale() {
        let context = Context::new();
        let hash = Lamp::type_hash_static();
        context.register_attribute(hash, "Brightness", Variant::Double(1.0));
        context.register_attribute(hash, "Enabled", Variant::Bool(true));
        assert_eq!(context.attributes(hash).len(), 2);

        context.remove_all_attributes(hash);
        assert!(context.attributes(hash).is_empty());
    }

    #[test]
    fn subsystem_lifecycle() {
        let context = Context::new();
        context.register_subsystem(Arc::new(Lamp));
        assert!(context.subsystem(Lamp::type_hash_static()).is_some());

        context.remove_subsystem(Lamp::type_hash_static());
        assert!(context.subsystem(Lamp::type_hash_static()).is_none());
        // Removing again is a no-op
        context.remove_subsystem(Lamp::type_hash_static());
    }

    #[test]
    fn globals_survive_between_reads() {
        let context = Context::new();
        context.set_global("ReloadCount", 3);
        assert_eq!(context.global("ReloadCount"), Some(Variant::Int(3)));
        assert_eq!(context.global("Missing"), None);
    }
}

//! End-to-end lifecycle tests: whatever a plugin registers during load is
//! gone after unload, and nothing else is touched.

use keel_core::{Context, NameHash, Object, TypeInfo};
use keel_plugin::{PluginApp, PluginEnv, PluginHost};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

/// A type minted at runtime through the non-generic registration path.
struct Minted {
    hash: NameHash,
}

impl Object for Minted {
    fn type_hash(&self) -> NameHash {
        self.hash
    }
    fn type_name(&self) -> &'static str {
        "Minted"
    }
}

#[derive(Default)]
struct Anchor;

impl Object for Anchor {
    fn type_hash(&self) -> NameHash {
        Self::type_hash_static()
    }
    fn type_name(&self) -> &'static str {
        Self::type_name_static()
    }
}

impl TypeInfo for Anchor {
    fn type_hash_static() -> NameHash {
        NameHash::new("Anchor")
    }
    fn type_name_static() -> &'static str {
        "Anchor"
    }
}

/// Registers every (name, category) pair it is given during load.
struct MintingPlugin {
    types: Vec<(String, Option<String>)>,
}

impl PluginApp for MintingPlugin {
    fn load(&mut self, env: &mut PluginEnv) {
        for (name, category) in &self.types {
            let hash = NameHash::new(name);
            // Duplicate names collapse to one registration
            let _ = env.register_factory_with(hash, name.clone(), category.as_deref(), move || {
                Box::new(Minted { hash })
            });
        }
    }
}

// Lowercase first letter keeps generated names disjoint from the
// engine-owned "Anchor" baseline; likewise for the "Engine" category.
fn type_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][A-Za-z0-9]{0,11}"
}

proptest! {
    /// After unload, none of the types registered during load remain
    /// resolvable, and the registry is back to its pre-load state.
    #[test]
    fn register_unload_round_trip(
        types in proptest::collection::vec(
            (type_name_strategy(), proptest::option::of("[a-z]{1,8}")),
            0..16,
        )
    ) {
        let context = Context::new();
        // Engine-owned baseline registration that must survive the plugin
        context.register_factory::<Anchor>(Some("Engine")).unwrap();

        let mut host = PluginHost::new("minting", Arc::clone(&context));
        let plugin_types = types.clone();
        host.load(move |_context| Box::new(MintingPlugin { types: plugin_types })).unwrap();

        for (name, _) in &types {
            prop_assert!(context.is_factory_registered(NameHash::new(name)));
        }

        host.step().unwrap();
        host.unload().unwrap();

        for (name, _) in &types {
            prop_assert!(!context.is_factory_registered(NameHash::new(name)));
            prop_assert!(context.create_object(NameHash::new(name)).is_err());
        }
        for (_, category) in &types {
            if let Some(category) = category {
                prop_assert!(context.types_in_category(category).is_empty());
            }
        }

        // Registrations the plugin never made are untouched
        prop_assert!(context.is_factory_registered(Anchor::type_hash_static()));
        prop_assert_eq!(context.types_in_category("Engine").len(), 1);
    }
}

// ================================================================
// Fixed scenarios
// ================================================================

struct TwoTypePlugin;

impl PluginApp for TwoTypePlugin {
    fn load(&mut self, env: &mut PluginEnv) {
        for name in ["TypeA", "TypeB"] {
            let hash = NameHash::new(name);
            env.register_factory_with(hash, name, None, move || Box::new(Minted { hash }))
                .unwrap();
        }
    }
}

#[test]
fn step_loop_then_unload_leaves_only_plugin_types_removed() {
    let context = Context::new();
    context.register_factory::<Anchor>(None).unwrap();

    let mut host = PluginHost::new("two-type", Arc::clone(&context));
    host.load(|_context| Box::new(TwoTypePlugin)).unwrap();

    for _ in 0..3 {
        host.step().unwrap();
    }
    host.unload().unwrap();

    assert!(!context.is_factory_registered(NameHash::new("TypeA")));
    assert!(!context.is_factory_registered(NameHash::new("TypeB")));
    // No removal reached any type the plugin didn't register
    assert!(context.is_factory_registered(Anchor::type_hash_static()));
    assert!(context.create_object(Anchor::type_hash_static()).is_ok());
}

#[test]
fn created_objects_report_minted_hash() {
    let context = Context::new();
    let mut host = PluginHost::new("two-type", Arc::clone(&context));
    host.load(|_context| Box::new(TwoTypePlugin)).unwrap();

    let object = context.create_object(NameHash::new("TypeA")).unwrap();
    assert_eq!(object.type_hash(), NameHash::new("TypeA"));
    host.unload().unwrap();
}

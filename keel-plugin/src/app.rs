//! Plugin application trait, registration ledger, and lifecycle host.

use keel_core::{Context, NameHash, Object, TypeInfo};
use keel_events::{EventBus, EventHandler, ReceiverId};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::{PluginError, Result};

/// Lifecycle state of a hosted plugin, owned exclusively by the host.
/// The plugin module itself is stateless about this; anything that must
/// survive a reload travels through the reload slot's userdata instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Running,
    Stopped,
}

/// Callbacks a plugin implements. All are optional.
///
/// `load` is the place to register custom types and subscribe to events;
/// `unload` is the place to undo anything registered manually. Whatever
/// went through the environment's registration helpers is retracted
/// automatically either way.
pub trait PluginApp: Send {
    fn load(&mut self, _env: &mut PluginEnv) {}
    /// May be called multiple times, but never again before the next `stop`.
    fn start(&mut self, _env: &mut PluginEnv) {}
    fn stop(&mut self, _env: &mut PluginEnv) {}
    fn unload(&mut self, _env: &mut PluginEnv) {}
}

/// The environment a plugin registers itself against: the shared context,
/// an optional event bus, and the ledger of everything registered so far.
///
/// Dropping the environment retracts every recorded registration, in
/// reverse registration order, so later-registered types that depend on
/// earlier ones unwind first. Retraction is idempotent; a plugin that
/// already cleaned up manually loses nothing.
pub struct PluginEnv {
    context: Arc<Context>,
    bus: Option<Arc<Mutex<EventBus>>>,
    registered: Vec<(NameHash, Option<String>)>,
    receivers: Vec<ReceiverId>,
}

impl PluginEnv {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            bus: None,
            registered: Vec::new(),
            receivers: Vec::new(),
        }
    }

    pub fn with_event_bus(context: Arc<Context>, bus: Arc<Mutex<EventBus>>) -> Self {
        Self {
            context,
            bus: Some(bus),
            registered: Vec::new(),
            receivers: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Registers a factory with the shared registry and records it for
    /// automatic retraction on unload.
    pub fn register_factory<T>(&mut self, category: Option<&str>) -> Result<()>
    where
        T: Object + TypeInfo + Default + 'static,
    {
        self.context.register_factory::<T>(category)?;
        self.record_factory(T::type_hash_static(), category);
        Ok(())
    }

    /// Non-generic registration for types minted at runtime, recorded for
    /// retraction like the typed path.
    pub fn register_factory_with<F>(
        &mut self,
        type_hash: NameHash,
        type_name: impl Into<String>,
        category: Option<&str>,
        construct: F,
    ) -> Result<()>
    where
        F: Fn() -> Box<dyn Object> + Send + Sync + 'static,
    {
        self.context
            .register_factory_with(type_hash, type_name, category, construct)?;
        self.record_factory(type_hash, category);
        Ok(())
    }

    /// Appends a (type, category) pair to the retraction ledger. Called by
    /// `register_factory`; exposed for registrations made through other
    /// paths that still want the unload safety net.
    pub fn record_factory(&mut self, type_hash: NameHash, category: Option<&str>) {
        self.registered.push((type_hash, category.map(str::to_string)));
    }

    /// Types recorded for retraction, in registration order.
    pub fn registered_types(&self) -> &[(NameHash, Option<String>)] {
        &self.registered
    }

    /// Subscribes a handler through the engine event bus, recording the
    /// receiver so the subscription is purged on unload.
    pub fn subscribe(&mut self, event_type: NameHash, handler: EventHandler) -> Result<()> {
        let Some(bus) = &self.bus else {
            return Err(PluginError::NotLoaded);
        };
        let receiver = handler.receiver();
        if !self.receivers.contains(&receiver) {
            self.receivers.push(receiver);
        }
        bus.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe(event_type, handler);
        Ok(())
    }

    fn retract_all(&mut self) {
        // Reverse order: dependents unwind before their dependencies.
        for (type_hash, category) in self.registered.drain(..).rev() {
            self.context.remove_factory(type_hash, category.as_deref());
            self.context.remove_all_attributes(type_hash);
            self.context.remove_subsystem(type_hash);
            debug!(type_hash = %type_hash, "plugin registration retracted");
        }
        if let Some(bus) = &self.bus {
            let mut bus = bus.lock().unwrap_or_else(PoisonError::into_inner);
            for receiver in self.receivers.drain(..) {
                bus.unsubscribe_receiver(receiver);
            }
        }
    }
}

impl Drop for PluginEnv {
    fn drop(&mut self) {
        self.retract_all();
    }
}

/// A resident plugin: its application object plus its environment.
pub struct LoadedPlugin {
    app: Box<dyn PluginApp>,
    env: PluginEnv,
}

impl LoadedPlugin {
    pub fn new(app: Box<dyn PluginApp>, env: PluginEnv) -> Self {
        Self { app, env }
    }

    pub fn context(&self) -> Arc<Context> {
        Arc::clone(&self.env.context)
    }

    pub fn env(&self) -> &PluginEnv {
        &self.env
    }

    pub(crate) fn load(&mut self) {
        self.app.load(&mut self.env);
    }

    pub(crate) fn start(&mut self) {
        self.app.start(&mut self.env);
    }

    pub(crate) fn stop(&mut self) {
        self.app.stop(&mut self.env);
    }

    pub(crate) fn unload(&mut self) {
        self.app.unload(&mut self.env);
    }
}

/// Owns the lifecycle of one plugin instance.
///
/// Only `load` and `unload`/`close` mutate the type registry. Reload is
/// `unload` followed by `load` of a possibly rebuilt image against the
/// same context.
pub struct PluginHost {
    context: Arc<Context>,
    bus: Option<Arc<Mutex<EventBus>>>,
    name: String,
    plugin: Option<LoadedPlugin>,
    state: LifecycleState,
}

impl PluginHost {
    pub fn new(name: impl Into<String>, context: Arc<Context>) -> Self {
        Self {
            context,
            bus: None,
            name: name.into(),
            plugin: None,
            state: LifecycleState::Unloaded,
        }
    }

    /// A host whose plugins can subscribe to events through their
    /// environment; subscriptions are purged on unload.
    pub fn with_event_bus(
        name: impl Into<String>,
        context: Arc<Context>,
        bus: Arc<Mutex<EventBus>>,
    ) -> Self {
        Self {
            context,
            bus: Some(bus),
            name: name.into(),
            plugin: None,
            state: LifecycleState::Unloaded,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Constructs the plugin through `factory` and drives its `load`
    /// callback so it can register factories and subsystems.
    pub fn load<F>(&mut self, factory: F) -> Result<()>
    where
        F: FnOnce(Arc<Context>) -> Box<dyn PluginApp>,
    {
        if self.state != LifecycleState::Unloaded {
            return Err(PluginError::AlreadyLoaded(self.name.clone()));
        }
        let app = factory(Arc::clone(&self.context));
        let env = match &self.bus {
            Some(bus) => PluginEnv::with_event_bus(Arc::clone(&self.context), Arc::clone(bus)),
            None => PluginEnv::new(Arc::clone(&self.context)),
        };
        let mut plugin = LoadedPlugin::new(app, env);
        plugin.load();
        info!(plugin = %self.name, types = plugin.env.registered.len(), "plugin loaded");
        self.plugin = Some(plugin);
        self.state = LifecycleState::Loaded;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, LifecycleState::Loaded | LifecycleState::Stopped) {
            return Err(PluginError::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }
        self.plugin_mut()?.start();
        self.state = LifecycleState::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.state != LifecycleState::Running {
            return Err(PluginError::InvalidTransition {
                operation: "stop",
                state: self.state,
            });
        }
        self.plugin_mut()?.stop();
        self.state = LifecycleState::Stopped;
        Ok(())
    }

    /// Per-tick hook while the plugin is resident. Reserved for future
    /// per-frame plugin logic; currently validates residency only.
    pub fn step(&mut self) -> Result<()> {
        if self.plugin.is_none() {
            return Err(PluginError::NotLoaded);
        }
        Ok(())
    }

    /// Drives the plugin's `unload` callback, then retracts everything it
    /// registered. The context stays with the host for a successor image.
    pub fn unload(&mut self) -> Result<()> {
        if !matches!(self.state, LifecycleState::Loaded | LifecycleState::Stopped) {
            return Err(PluginError::InvalidTransition {
                operation: "unload",
                state: self.state,
            });
        }
        let mut plugin = self.plugin.take().ok_or(PluginError::NotLoaded)?;
        plugin.unload();
        drop(plugin); // environment drop retracts recorded registrations
        self.state = LifecycleState::Unloaded;
        info!(plugin = %self.name, "plugin unloaded");
        Ok(())
    }

    /// Same retraction path as `unload`, used when shutting the plugin
    /// down for good.
    pub fn close(&mut self) -> Result<()> {
        if self.state == LifecycleState::Running {
            warn!(plugin = %self.name, "closing a running plugin; stopping first");
            self.stop()?;
        }
        self.unload()
    }

    fn plugin_mut(&mut self) -> Result<&mut LoadedPlugin> {
        self.plugin.as_mut().ok_or(PluginError::NotLoaded)
    }
}

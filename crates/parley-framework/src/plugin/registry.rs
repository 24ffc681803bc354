//! Plugin registration and dependency resolution.
//!
//! [`PluginRegistry`] owns the registered plugins and the shared values they
//! may depend on. Resolution happens once, through
//! [`resolve_all`](PluginRegistry::resolve_all):
//!
//! - `Value` slots look the declared type name up first and fall back to the
//!   slot key.
//! - `Logger` slots get a child of the registry logger named after the plugin.
//! - `Event` slots get emitters forwarding into the host, tagged with the
//!   plugin name.
//! - `Config` slots get the plugin's settings section (empty when absent).
//!
//! The first unmet required slot aborts resolution; no plugin is bound in
//! that case.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{debug, info};

use super::dependency::{Bindings, DependencyKind, EventSlot, PluginSettings, ServiceArc};
use super::events::{ActivityEmitter, ErrorEmitter, EventSink};
use super::logger::Logger;
use super::{Plugin, PluginMetadata};
use crate::error::{RegistryError, RegistryResult};

/// A registered plugin.
#[derive(Clone)]
pub struct PluginEntry {
    pub metadata: PluginMetadata,
    /// Rust type name of the concrete plugin.
    pub type_name: &'static str,
    pub plugin: Arc<dyn Plugin>,
}

impl PluginEntry {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.metadata.name)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

pub struct PluginRegistry {
    plugins: Vec<PluginEntry>,
    by_key: HashMap<String, ServiceArc>,
    by_type: HashMap<&'static str, ServiceArc>,
    settings: HashMap<String, PluginSettings>,
    logger: Logger,
    resolved: bool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::with_logger(Logger::new("parley"))
    }

    pub fn with_logger(logger: Logger) -> Self {
        Self {
            plugins: Vec::new(),
            by_key: HashMap::new(),
            by_type: HashMap::new(),
            settings: HashMap::new(),
            logger,
            resolved: false,
        }
    }

    /// Adds a plugin.
    ///
    /// The plugin itself becomes resolvable by its name and by its type, so
    /// other plugins may depend on it.
    pub fn register<P: Plugin>(&mut self, plugin: P) -> RegistryResult<()> {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc<P: Plugin>(&mut self, plugin: Arc<P>) -> RegistryResult<()> {
        let metadata = plugin.metadata();
        if self.get(&metadata.name).is_some() {
            return Err(RegistryError::DuplicatePlugin(metadata.name));
        }

        let type_name = type_name::<P>();
        let value: ServiceArc = Arc::new(plugin.clone());
        self.by_key.insert(metadata.name.clone(), value.clone());
        self.by_type.insert(type_name, value);

        debug!(
            plugin  = %metadata.name,
            version = %metadata.version,
            r#type  = type_name,
            "Plugin registered"
        );
        self.plugins.push(PluginEntry {
            metadata,
            type_name,
            plugin,
        });
        Ok(())
    }

    /// Makes a shared value available under `key` and under the type name
    /// of `T`.
    pub fn provide<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        key: impl Into<String>,
        value: Arc<T>,
    ) {
        let value: ServiceArc = Arc::new(value);
        self.by_key.insert(key.into(), value.clone());
        self.by_type.insert(type_name::<T>(), value);
    }

    /// Sets the configuration section injected into `Config` slots.
    pub fn set_settings(&mut self, plugin: impl Into<String>, settings: Value) {
        self.settings
            .insert(plugin.into(), PluginSettings::new(settings));
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|entry| entry.metadata.name == name)
    }

    /// Plugins in registration order.
    pub fn plugins(&self) -> &[PluginEntry] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolves the dependency manifest of one plugin.
    pub fn resolve(
        &self,
        entry: &PluginEntry,
        sink: &Weak<dyn EventSink>,
    ) -> RegistryResult<Bindings> {
        let name = entry.name();
        let mut bindings = Bindings::default();

        for dependency in entry.plugin.dependencies() {
            let key = dependency.key.as_ref();
            let value: Option<ServiceArc> = match dependency.kind {
                DependencyKind::Value => dependency
                    .type_name
                    .and_then(|type_name| self.by_type.get(type_name))
                    .or_else(|| self.by_key.get(key))
                    .cloned(),
                DependencyKind::Logger => Some(host_value(self.logger.child(name))),
                DependencyKind::Event(EventSlot::Activity) => {
                    Some(host_value(ActivityEmitter::new(name, sink.clone())))
                }
                DependencyKind::Event(EventSlot::Error) => {
                    Some(host_value(ErrorEmitter::new(name, sink.clone())))
                }
                DependencyKind::Config => {
                    let settings = self.settings.get(name).cloned().unwrap_or_default();
                    Some(host_value(settings))
                }
            };

            match value {
                Some(value) => bindings.insert(key, value),
                None if dependency.optional => {
                    debug!(plugin = %name, slot = %key, "Optional dependency left unset");
                }
                None => {
                    return Err(RegistryError::MissingDependency {
                        plugin: name.to_owned(),
                        slot: key.to_owned(),
                        type_name: dependency.describe_type(),
                    });
                }
            }
        }

        Ok(bindings)
    }

    /// Resolves every plugin, then binds them all.
    ///
    /// Either every plugin is bound or none is.
    pub fn resolve_all(&mut self, sink: Weak<dyn EventSink>) -> RegistryResult<()> {
        if self.resolved {
            return Err(RegistryError::AlreadyResolved);
        }

        let resolved = self
            .plugins
            .iter()
            .map(|entry| self.resolve(entry, &sink))
            .collect::<RegistryResult<Vec<_>>>()?;

        for (entry, bindings) in self.plugins.iter().zip(resolved) {
            debug!(plugin = %entry.name(), slots = bindings.len(), "Binding plugin");
            entry.plugin.bind(bindings);
        }
        self.resolved = true;

        info!(count = self.plugins.len(), "Plugins resolved");
        Ok(())
    }
}

/// Wraps a host-made value the way provided values are stored.
fn host_value<T: Send + Sync + 'static>(value: T) -> ServiceArc {
    Arc::new(Arc::new(value))
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins)
            .field("provided", &self.by_key.keys().collect::<Vec<_>>())
            .field("resolved", &self.resolved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::plugin::Dependency;
    use crate::testing::RecordingSink;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    struct Consumer {
        name: &'static str,
        deps: Vec<Dependency>,
        bound: OnceLock<Bindings>,
    }

    impl Consumer {
        fn new(name: &'static str, deps: Vec<Dependency>) -> Self {
            Self {
                name,
                deps,
                bound: OnceLock::new(),
            }
        }
    }

    impl Plugin for Consumer {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new(self.name)
        }

        fn dependencies(&self) -> Vec<Dependency> {
            self.deps.clone()
        }

        fn bind(&self, bindings: Bindings) {
            let _ = self.bound.set(bindings);
        }
    }

    fn sink() -> (Arc<RecordingSink>, Weak<dyn EventSink>) {
        let sink = Arc::new(RecordingSink::default());
        let weak = Arc::downgrade(&sink) as Weak<dyn EventSink>;
        (sink, weak)
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(Consumer::new("a", vec![])).unwrap();

        let err = registry.register(Consumer::new("a", vec![])).unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePlugin("a".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_required_dependency_fails() {
        let (_sink, weak) = sink();
        let mut registry = PluginRegistry::new();
        registry
            .register(Consumer::new("needy", vec![Dependency::of::<dyn Greeter>("greeter")]))
            .unwrap();

        let err = registry.resolve_all(weak).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MissingDependency { ref plugin, ref slot, .. }
                if plugin == "needy" && slot == "greeter"
        ));
        assert!(!registry.is_resolved());
    }

    #[test]
    fn optional_dependency_is_left_unset() {
        let (_sink, weak) = sink();
        let consumer = Arc::new(Consumer::new(
            "relaxed",
            vec![Dependency::of::<dyn Greeter>("greeter").optional()],
        ));
        let mut registry = PluginRegistry::new();
        registry.register_arc(consumer.clone()).unwrap();

        registry.resolve_all(weak).unwrap();

        let bound = consumer.bound.get().unwrap();
        assert!(bound.get::<dyn Greeter>("greeter").is_none());
        assert!(bound.is_empty());
    }

    #[test]
    fn values_resolve_by_type_then_key() {
        let (_sink, weak) = sink();
        let consumer = Arc::new(Consumer::new(
            "consumer",
            vec![
                Dependency::of::<dyn Greeter>("renamed-slot"),
                Dependency::named("motd"),
            ],
        ));
        let mut registry = PluginRegistry::new();
        registry.provide::<dyn Greeter>("greeter", Arc::new(English));
        registry.provide("motd", Arc::new(String::from("welcome")));
        registry.register_arc(consumer.clone()).unwrap();

        registry.resolve_all(weak).unwrap();

        let bound = consumer.bound.get().unwrap();
        assert_eq!(bound.get::<dyn Greeter>("renamed-slot").unwrap().greet(), "hello");
        assert_eq!(bound.get::<String>("motd").unwrap().as_str(), "welcome");
    }

    #[test]
    fn plugins_can_depend_on_plugins() {
        let (_sink, weak) = sink();
        let consumer = Arc::new(Consumer::new("second", vec![Dependency::of::<Consumer>("first")]));
        let mut registry = PluginRegistry::new();
        registry.register(Consumer::new("first", vec![])).unwrap();
        registry.register_arc(consumer.clone()).unwrap();

        registry.resolve_all(weak).unwrap();

        let first = consumer.bound.get().unwrap().get::<Consumer>("first").unwrap();
        assert_eq!(first.name, "first");
    }

    #[test]
    fn host_slots_are_scoped_to_the_plugin() {
        let (_sink, weak) = sink();
        let consumer = Arc::new(Consumer::new(
            "http",
            vec![
                Dependency::logger("log"),
                Dependency::event("emit", EventSlot::Activity),
                Dependency::event("fail", EventSlot::Error),
                Dependency::config("settings"),
            ],
        ));
        let mut registry = PluginRegistry::new();
        registry.set_settings("http", serde_json::json!({ "port": 3978 }));
        registry.register_arc(consumer.clone()).unwrap();

        registry.resolve_all(weak).unwrap();

        let bound = consumer.bound.get().unwrap();
        assert_eq!(bound.get::<Logger>("log").unwrap().name(), "parley.http");
        assert_eq!(bound.get::<ActivityEmitter>("emit").unwrap().plugin(), "http");
        assert!(bound.get::<ErrorEmitter>("fail").is_some());

        #[derive(serde::Deserialize)]
        struct Http {
            port: u16,
        }
        let settings = bound.get::<PluginSettings>("settings").unwrap();
        assert_eq!(settings.get::<Http>().unwrap().port, 3978);
    }

    #[test]
    fn resolution_happens_once() {
        let (_sink, weak) = sink();
        let mut registry = PluginRegistry::new();
        registry.resolve_all(weak.clone()).unwrap();
        assert_eq!(registry.resolve_all(weak), Err(RegistryError::AlreadyResolved));
    }
}

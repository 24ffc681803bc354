//! Dependency declarations and the values they resolve to.

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Heterogeneous value stored in the registry.
///
/// The inner `dyn Any` is always an `Arc<T>` (where `T` may be a trait
/// object); consumers downcast back to `Arc<T>`.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

/// Which host event an event slot forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSlot {
    /// Resolves to an [`ActivityEmitter`](super::ActivityEmitter).
    Activity,
    /// Resolves to an [`ErrorEmitter`](super::ErrorEmitter).
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// A provided service or another plugin.
    Value,
    /// A [`Logger`](super::Logger) scoped to the plugin.
    Logger,
    /// An emitter into the host.
    Event(EventSlot),
    /// The plugin's [`PluginSettings`].
    Config,
}

/// One slot in a plugin's dependency manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Slot name; the key under which the value is found in [`Bindings`],
    /// and the fallback lookup key in the registry.
    pub key: Cow<'static, str>,
    /// Type name tried first during lookup.
    pub type_name: Option<&'static str>,
    pub optional: bool,
    pub kind: DependencyKind,
}

impl Dependency {
    fn with_kind(key: impl Into<Cow<'static, str>>, kind: DependencyKind) -> Self {
        Self {
            key: key.into(),
            type_name: None,
            optional: false,
            kind,
        }
    }

    /// A value of type `T`, looked up by type and then by `key`.
    ///
    /// `T` may be unsized: `Dependency::of::<dyn CredentialProvider>(…)`.
    pub fn of<T: ?Sized + 'static>(key: impl Into<Cow<'static, str>>) -> Self {
        Self {
            type_name: Some(type_name::<T>()),
            ..Self::with_kind(key, DependencyKind::Value)
        }
    }

    /// A value looked up by key only.
    pub fn named(key: impl Into<Cow<'static, str>>) -> Self {
        Self::with_kind(key, DependencyKind::Value)
    }

    pub fn logger(key: impl Into<Cow<'static, str>>) -> Self {
        Self::with_kind(key, DependencyKind::Logger)
    }

    pub fn event(key: impl Into<Cow<'static, str>>, slot: EventSlot) -> Self {
        Self::with_kind(key, DependencyKind::Event(slot))
    }

    pub fn config(key: impl Into<Cow<'static, str>>) -> Self {
        Self::with_kind(key, DependencyKind::Config)
    }

    /// Leaves the slot unset instead of failing when nothing provides it.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Human-readable type description used in errors.
    pub(crate) fn describe_type(&self) -> String {
        match (self.kind, self.type_name) {
            (DependencyKind::Value, Some(name)) => name.to_owned(),
            (DependencyKind::Value, None) => "any".to_owned(),
            (DependencyKind::Logger, _) => "Logger".to_owned(),
            (DependencyKind::Event(EventSlot::Activity), _) => "ActivityEmitter".to_owned(),
            (DependencyKind::Event(EventSlot::Error), _) => "ErrorEmitter".to_owned(),
            (DependencyKind::Config, _) => "PluginSettings".to_owned(),
        }
    }
}

// ─── Bindings ─────────────────────────────────────────────────────────────────

/// The resolved dependencies of one plugin, keyed by slot name.
#[derive(Default, Clone)]
pub struct Bindings {
    values: HashMap<String, ServiceArc>,
}

impl Bindings {
    pub(crate) fn insert(&mut self, key: impl Into<String>, value: ServiceArc) {
        self.values.insert(key.into(), value);
    }

    /// Returns the value bound to `key` if it is an `Arc<T>`.
    ///
    /// Unset optional slots and type mismatches both yield `None`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.values.get(key)?.downcast_ref::<Arc<T>>().cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

// ─── PluginSettings ───────────────────────────────────────────────────────────

/// A plugin's configuration section (`plugins.<name>`), or an empty object.
#[derive(Debug, Clone)]
pub struct PluginSettings(Arc<Value>);

impl PluginSettings {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn empty() -> Self {
        Self::new(Value::Object(Default::default()))
    }

    /// Deserializes the section into `T`.
    ///
    /// Use `#[serde(default)]` on `T` to make every field optional.
    pub fn get<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.0.as_ref())
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self::empty()
    }
}

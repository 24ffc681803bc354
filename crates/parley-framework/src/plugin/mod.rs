//! Plugin system for the Parley framework.
//!
//! # Architecture
//!
//! A plugin is any type implementing [`Plugin`]. It declares what it needs
//! through [`Plugin::dependencies`]; the [`PluginRegistry`] resolves those
//! declarations once at startup and hands the result to [`Plugin::bind`].
//! Everything else is optional:
//!
//! - **Lifecycle** — `on_start` / `on_stop`
//! - **Dispatch** — `activity_hook`, run before any router-selected handler
//! - **Observation** — `on_activity_sent`, `on_activity_response`, `on_error`
//! - **Capabilities** — `sender` (outbound sends) and `create_stream`
//!   (progressive responses)
//!
//! Transports are plugins too: they receive an [`ActivityEmitter`] through a
//! `DependencyKind::Event` slot and push inbound activities through it.
//!
//! # Quick start
//!
//! ```rust,ignore
//! struct Audit {
//!     log: OnceLock<Arc<Logger>>,
//! }
//!
//! #[async_trait]
//! impl Plugin for Audit {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("audit")
//!     }
//!
//!     fn dependencies(&self) -> Vec<Dependency> {
//!         vec![Dependency::logger("log")]
//!     }
//!
//!     fn bind(&self, bindings: Bindings) {
//!         if let Some(log) = bindings.get::<Logger>("log") {
//!             let _ = self.log.set(log);
//!         }
//!     }
//!
//!     async fn on_activity_response(&self, event: &ActivityResponseEvent) {
//!         // …
//!     }
//! }
//! ```

mod dependency;
mod events;
mod logger;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;

use parley_core::{BoxedSender, ConversationReference};

use crate::error::BoxError;
use crate::handler::BoxedHandler;
use crate::stream::Streamer;

pub use dependency::{Bindings, Dependency, DependencyKind, EventSlot, PluginSettings, ServiceArc};
pub use events::{
    ActivityEmitter, ActivityResponseEvent, ActivitySentEvent, ErrorEmitter, ErrorEvent,
    EventSink, InboundActivity,
};
pub use logger::Logger;
pub use registry::{PluginEntry, PluginRegistry};

// ─── PluginMetadata ───────────────────────────────────────────────────────────

/// Descriptive metadata attached to every plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Unique name within a registry.
    pub name: String,
    pub version: String,
    pub description: String,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "0.0.0".to_owned(),
            description: String::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A unit of functionality hosted by the app.
///
/// # Concurrency
///
/// Plugins are shared as `Arc<dyn Plugin>` across all dispatches. Use
/// interior mutability (`OnceLock`, `Mutex`, atomics) for anything that
/// changes after construction.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn metadata(&self) -> PluginMetadata;

    /// Slots this plugin wants filled before it starts.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Receives the resolved dependencies. Called exactly once, during app
    /// construction.
    fn bind(&self, _bindings: Bindings) {}

    async fn on_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// A handler run ahead of the router's handlers for every activity.
    ///
    /// Hooks of later-registered plugins run first.
    fn activity_hook(&self) -> Option<BoxedHandler> {
        None
    }

    async fn on_activity_sent(&self, _event: &ActivitySentEvent) {}

    async fn on_activity_response(&self, _event: &ActivityResponseEvent) {}

    async fn on_error(&self, _event: &ErrorEvent) {}

    /// Outbound send capability, if this plugin offers one.
    fn sender(&self) -> Option<BoxedSender> {
        None
    }

    /// Opens a progressive response for one conversation turn.
    fn create_stream(
        &self,
        _reference: &Arc<ConversationReference>,
    ) -> Option<Arc<dyn Streamer>> {
        None
    }
}

//! # Parley Framework
//!
//! The dispatch building blocks: everything between "an activity arrived"
//! and "the platform got its answer", minus the host that wires it together.
//!
//! - [`ActivityContext`] — per-dispatch context with the continuation chain
//!   ([`ActivityContext::next`]), outbound helpers and typed state
//! - [`Router`] — append-only route list with first-match selection
//! - [`handler`] — handler erasure and return-value conversion
//! - [`plugin`] — the [`Plugin`] trait, dependency manifests and the
//!   [`PluginRegistry`]
//! - [`stream`] — the [`Streamer`] handle and the coalescing
//!   [`StreamingBuffer`]

pub mod context;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod router;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{ActivityContext, ApiClient, ContextParts, Credentials};
pub use error::{BoxError, HandlerPanic, HandlerResult, RegistryError, RegistryResult};
pub use handler::{BoxedHandler, IntoHandlerResult, into_handler};
pub use plugin::{
    ActivityEmitter, ActivityResponseEvent, ActivitySentEvent, Bindings, Dependency,
    DependencyKind, ErrorEmitter, ErrorEvent, EventSink, EventSlot, InboundActivity, Logger,
    Plugin, PluginEntry, PluginMetadata, PluginRegistry, PluginSettings,
};
pub use router::{Route, Router, Selector, Subtype, TextPattern};
pub use stream::{
    NoopStreamer, StreamConfig, StreamEvent, StreamFragment, Streamer, StreamingBuffer,
};

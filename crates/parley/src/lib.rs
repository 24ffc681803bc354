//! # Parley
//!
//! A plugin-hosted framework for conversational bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ emit  ┌──────────────────────────────┐  reply/stream  ┌───────────┐
//! │ Transport │──────▶│ App                          │───────────────▶│  Sender   │
//! │  plugin   │◀──────│  hooks ─▶ routes ─▶ next()…  │                │ (plugin)  │
//! └───────────┘status └──────────────────────────────┘                └───────────┘
//! ```
//!
//! - **App**: resolves plugin dependencies, runs the dispatch pipeline and the
//!   start/stop lifecycle
//! - **Plugins**: transports, hooks and services, wired by declared
//!   dependencies
//! - **Router**: selectors in registration order; every match becomes a link
//!   in the handler chain
//! - **Handlers**: async closures over an [`ActivityContext`](framework::ActivityContext)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = AppBuilder::load(ConfigLoader::new())?
//!         .plugin(HttpPlugin::new())
//!         .routes(|router| {
//!             router.on_message(|ctx: ActivityContext| async move {
//!                 let text = ctx.activity().text.clone().unwrap_or_default();
//!                 ctx.reply(Activity::message(text)).await?;
//!                 Ok::<_, ApiError>(())
//!             });
//!         })
//!         .build()?;
//!
//!     app.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default), `yaml-config`: config file formats
//! - `json-log`: JSON log output
//! - `http-server` (default): the [`HttpPlugin`](transport::HttpPlugin)
//!   webhook endpoint
//! - `http-client`: the connector client alone

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;
#[cfg(any(feature = "http-client", feature = "http-server"))]
pub use parley_transport as transport;

/// Commonly used types for building a bot.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Host
    pub use parley_runtime::{App, AppBuilder, ConfigLoader, LoggingBuilder, ParleyConfig};

    // Activities
    pub use parley_core::{
        Activity, ActivityType, ApiError, Attachment, ChannelAccount, ConversationAccount,
        ConversationReference, CredentialProvider, Entity, InvokeResponse, Token,
    };

    // Handlers and routing
    pub use parley_framework::{
        ActivityContext, Router, Selector, StreamFragment, Subtype, TextPattern,
    };

    // Plugin authoring
    pub use parley_framework::{
        Bindings, BoxError, Dependency, EventSlot, Plugin, PluginMetadata, PluginSettings,
    };

    #[cfg(feature = "http-server")]
    pub use parley_transport::HttpPlugin;
}

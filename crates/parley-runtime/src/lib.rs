//! Parley Runtime - the application host.
//!
//! This crate provides:
//! - [`App`] / [`AppBuilder`]: plugin resolution, the dispatch pipeline and
//!   the start/stop lifecycle
//! - [`config`]: layered configuration (`parley.toml`, `PARLEY_*`)
//! - [`logging`]: tracing subscriber setup
//! - [`CredentialCache`]: per-tenant app token cache
//!
//! ```rust,ignore
//! use parley_runtime::{AppBuilder, config::ConfigLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = AppBuilder::load(ConfigLoader::new())?
//!         .plugin(HttpPlugin::new())
//!         .routes(|router| {
//!             router.message("ping", |ctx| async move {
//!                 ctx.reply(Activity::message("pong")).await?;
//!                 Ok::<_, ApiError>(())
//!             });
//!         })
//!         .build()?;
//!
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;

pub use app::{APP_SENDER, App, AppBuilder, CREDENTIALS_KEY, STREAMING_KEY};
pub use config::{ConfigError, ConfigLoader, ConfigResult, ParleyConfig};
pub use credentials::CredentialCache;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handlers and plugins.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

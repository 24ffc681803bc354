//! Configuration for the Parley host.
//!
//! Layered loading (defaults, files, `PARLEY_*` environment variables,
//! programmatic overrides) through figment, plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AppConfig, CredentialsConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ParleyConfig,
    SpanEventConfig, StreamingConfig,
};
pub use validation::validate_config;

//! Runtime error types.

use thiserror::Error;

use parley_framework::{BoxError, RegistryError};

use crate::config::ConfigError;

/// Errors that abort building or starting an [`App`](crate::App).
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Plugin registration or dependency resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A plugin's `on_start` hook failed.
    #[error("plugin '{plugin}' failed to start: {source}")]
    PluginStart {
        plugin: String,
        #[source]
        source: BoxError,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

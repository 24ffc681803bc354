//! Error types for the Parley framework.

use thiserror::Error;

use parley_core::InvokeResponse;

/// Error type returned by handlers and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler (and the chain's `next()`) resolves to.
///
/// `Ok(None)` means "no response of my own"; the chain keeps whatever an
/// earlier or later handler stored.
pub type HandlerResult = Result<Option<InvokeResponse>, BoxError>;

/// Errors raised while registering plugins and resolving their dependencies.
///
/// All of them are fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A plugin with the same name is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    /// A required dependency could not be found by type or by key.
    #[error("plugin '{plugin}' requires '{slot}' ({type_name}) but nothing provides it")]
    MissingDependency {
        plugin: String,
        slot: String,
        type_name: String,
    },

    /// Dependencies were already resolved for this registry.
    #[error("plugin dependencies were already resolved")]
    AlreadyResolved,
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A handler panicked; carried to the error hooks like any other failure.
#[derive(Debug, Clone, Error)]
#[error("handler panicked: {0}")]
pub struct HandlerPanic(pub String);

//! Error types shared across the Parley crates.
//!
//! Registry, configuration and runtime errors live in the crates that raise
//! them; this module only holds the errors of the core contracts.

use thiserror::Error;

use crate::activity::ActivityType;

// =============================================================================
// Activity Errors
// =============================================================================

/// An activity failed validation before being sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivityError {
    /// A field required by the activity's type is absent.
    #[error("{activity_type} activity is missing required field '{field}'")]
    MissingField {
        /// Type of the offending activity.
        activity_type: ActivityType,
        /// Wire name of the missing field.
        field: &'static str,
    },
}

// =============================================================================
// API Errors
// =============================================================================

/// Errors returned by [`ActivitySender`](crate::ActivitySender) implementations.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The remote service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The request timed out.
    #[error("request timed out")]
    Timeout,
    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The activity was rejected before it left the process.
    #[error(transparent)]
    Invalid(#[from] ActivityError),
    /// No plugin offers a send capability.
    #[error("no activity sender available")]
    NoSender,
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for send/update calls.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Credential Errors
// =============================================================================

/// Why a credential lookup produced nothing.
///
/// The dispatch pipeline never propagates these; a failed lookup becomes an
/// absent credential.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The user has not signed in to the requested connection.
    #[error("user is not signed in")]
    NotSignedIn,
    /// The credential service could not be reached or refused the request.
    #[error("credential unavailable: {0}")]
    Unavailable(String),
}

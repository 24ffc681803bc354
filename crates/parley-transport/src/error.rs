//! Transport error types.

use thiserror::Error;

use parley_core::ApiError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound endpoint settings could not be read.
    #[error("invalid http settings: {0}")]
    Settings(String),

    /// `serviceUrl` is not an absolute http(s) base URL.
    #[error("invalid service url '{0}'")]
    InvalidServiceUrl(String),

    #[cfg(feature = "http-client")]
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Transport(err.to_string())
    }
}

#[cfg(feature = "http-client")]
pub(crate) fn api_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(err.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

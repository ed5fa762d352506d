//! Error type for the bollard backed engine.

use thiserror::Error;

/// Errors raised by [`super::DockerEngine`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DockerEngineError {
    /// Raised when the configured API version is not `MAJOR.MINOR`.
    #[error("invalid docker API version `{0}`; expected MAJOR.MINOR")]
    InvalidApiVersion(String),
    /// Raised when a client for the endpoint cannot be constructed.
    #[error("failed to connect to docker host {endpoint}: {message}")]
    Connect {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Underlying client error.
        message: String,
    },
    /// Raised when the in-memory build context cannot be assembled.
    #[error("failed to prepare build context: {message}")]
    Context {
        /// Underlying archive error.
        message: String,
    },
    /// Raised when the engine rejects or fails a request.
    #[error("docker engine error: {message}")]
    Engine {
        /// Message reported by the client library.
        message: String,
    },
}

impl From<bollard::errors::Error> for DockerEngineError {
    fn from(value: bollard::errors::Error) -> Self {
        Self::Engine {
            message: value.to_string(),
        }
    }
}

impl From<std::io::Error> for DockerEngineError {
    fn from(value: std::io::Error) -> Self {
        Self::Context {
            message: value.to_string(),
        }
    }
}

//! Error taxonomy for the request lifecycle manager.
//!
//! Configuration and argument errors are reported synchronously at the call
//! that triggered them. Transport and reformation errors are always delivered
//! through the failure callback, never thrown synchronously, since dispatch is
//! asynchronous by design. Task-control errors on batch elements are collected
//! per element without aborting the rest of the batch.

use crate::types::TaskId;

/// Unified error type for all lifecycle-manager operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The merged configuration is unusable (e.g. empty base address with a
    /// relative target path).
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// A caller precondition was violated (empty descriptor, blank model).
    ///
    /// This is a programming error on the caller's side, not a runtime
    /// condition the library recovers from.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Human-readable error message.
        message: String,
    },

    /// A control operation referenced a task identifier the registry has
    /// never seen.
    #[error("unknown task: {id}")]
    UnknownTask {
        /// The identifier that was not recognized.
        id: TaskId,
    },

    /// A reformation strategy failed or returned an unreadable payload.
    #[error("reformation failed: {message}")]
    Reformation {
        /// Human-readable error message.
        message: String,
    },

    // -- Transport-side errors, passed through opaquely from the gateway --
    /// Transport-level error (connection failed, request failed, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Request or transfer timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// File I/O failed during upload or download.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON encoding or decoding failed.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Catch-all for errors that don't fit other categories.
    #[error("{0}")]
    Other(String),
}

/// Convenience result type for lifecycle-manager operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    // -- Convenience constructors --

    /// Create a `Configuration` error with a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an `InvalidArgument` error with a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an `UnknownTask` error for the given identifier.
    pub fn unknown_task(id: TaskId) -> Self {
        Self::UnknownTask { id }
    }

    /// Create a `Reformation` error with a message.
    pub fn reformation(message: impl Into<String>) -> Self {
        Self::Reformation {
            message: message.into(),
        }
    }

    /// Create a `Transport` error with a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// True if this error is reported synchronously to the caller
    /// (configuration and precondition violations), as opposed to errors
    /// delivered through the failure callback.
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. } | Error::InvalidArgument { .. } | Error::UnknownTask { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

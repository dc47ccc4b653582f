//! Error types for driver operations.

use std::path::PathBuf;

use hashq_engine::EngineError;
use thiserror::Error;

/// Errors that can occur in store, iterator and queue operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied value failed validation before reaching the engine.
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument {
        /// The offending argument.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The engine refused to open a store or produce a handle.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A path that must exist does not.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Engine failure on a data-path call.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A pair batch stopped at an engine failure after `pushed` pairs.
    #[error("Batch interrupted after {pushed} pairs: {source}")]
    BatchInterrupted {
        /// Pairs pushed before the failure.
        pushed: usize,
        /// The failure.
        #[source]
        source: EngineError,
    },
}

impl Error {
    pub(crate) fn invalid(field: &str, reason: &str) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        match err {
            crate::config::ConfigError::InvalidValue { field, reason } => {
                Self::InvalidArgument { field, reason }
            }
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

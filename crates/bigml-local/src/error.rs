//! Error taxonomy for local predictions
//!
//! Load errors keep an object from ever becoming ready. Validation and
//! configuration errors are local to a single prediction call.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving and parsing a resource.
///
/// Cloneable because a single failure is delivered to every listener queued
/// on the object that was loading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("wrong resource id: {0}")]
    InvalidId(String),

    #[error("resource {0} could not be found")]
    NotFound(String),

    #[error("resource {resource} is not finished (status {code}: {message})")]
    NotFinished {
        resource: String,
        code: i32,
        message: String,
    },

    #[error("resource {0} is faulty")]
    Faulty(String),

    #[error("resource does not contain the required \"{0}\" information")]
    MissingKey(String),

    #[error("malformed resource: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("remote fetch failed: {0}")]
    Remote(String),

    #[error("no source is configured to resolve {0}")]
    NoSource(String),

    #[error("loading was abandoned before completion")]
    Abandoned,
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Malformed(err.to_string())
    }
}

/// Top level error for every public operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The backing resource could not be loaded; the object never becomes ready
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Input data failed casting or lacks required values
    #[error("invalid input data: {0}")]
    Validation(String),

    /// The operation is not defined for this kind of model
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Malformed operating point, operating kind or combiner options
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// True when the error prevents the object from ever becoming ready
    pub fn is_load_error(&self) -> bool {
        matches!(self, Error::Load(_))
    }
}

//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Volume enumeration failed: {0}")]
    VolumeEnumeration(String),

    #[error("Export job '{context}' failed: {message}")]
    JobFailed { context: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn volume(msg: impl Into<String>) -> Self {
        Self::VolumeEnumeration(msg.into())
    }

    pub fn job_failed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JobFailed {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

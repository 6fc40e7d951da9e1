//! Error types for Shipwright.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Definition errors
    #[error("Invalid pipeline definition: {0}")]
    InvalidPipeline(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Run errors
    #[error("Run cancelled")]
    RunCancelled,

    // Step errors
    #[error("Step '{step}' failed with exit code {exit_code}")]
    StepFailed { step: String, exit_code: i32 },

    // Artifact errors
    #[error("Artifact slot '{slot}' already written by '{producer}'")]
    DuplicateWrite { slot: String, producer: String },

    #[error("No artifact slot matches '{0}'")]
    SlotNotFound(String),

    // Publish errors
    #[error("Publish failed for {failed} of {total} artifacts")]
    PublishFailed { failed: usize, total: usize },

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

//! Core domain errors.

use thiserror::Error;

/// Core domain errors for batchlet.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The task carries no embedded pod payload.
    #[error("Task has no '{key}' environment setting")]
    MissingPayload { key: String },

    /// The embedded payload uses a schema version this build cannot read.
    #[error("Unsupported pod payload version: {0}")]
    UnsupportedPayloadVersion(u32),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! Error types for the batch client.

use thiserror::Error;

/// Errors that can occur when talking to the batch service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Resource not found.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Resource already exists.
    #[error("already exists: {resource}")]
    Conflict { resource: String },

    /// The service rejected the request.
    #[error("batch service error (HTTP {status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Create a NotFound error for a resource description.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a Conflict error for a resource description.
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    /// Returns true if the service reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the service reported the resource as already existing.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

//! Error types for the Strata control plane

use thiserror::Error;

/// Main error type for Strata operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for quota specs or admission payloads
    #[error("validation error: {0}")]
    Validation(String),

    /// A persisted identifier or quantity could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Cluster handle resolution or cross-cluster access error
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A status read-modify-write loop exhausted its retry budget
    #[error("status update conflict: {0}")]
    StatusConflict(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a cluster error with the given message
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// True if this error is an optimistic-concurrency conflict (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}

//! Error types for directory and node metadata operations

use thiserror::Error;

/// Errors from the control-plane directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory could not be reached or refused the request
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Node is unknown to the directory
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// Node exists but reports no InternalIP address
    #[error("Node '{0}' has no InternalIP address")]
    NoInternalIp(String),

    /// A stored object could not be interpreted
    #[error("Invalid record '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for directory operations
pub type Result<T> = std::result::Result<T, DirectoryError>;

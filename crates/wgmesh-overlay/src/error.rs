//! Error types for tunnel device operations

use thiserror::Error;

/// Errors that can occur while managing the local WireGuard device
#[derive(Debug, Error)]
pub enum OverlayError {
    /// `ip` or `wg` binary missing from the host
    #[error("Tunnel tooling not available: {0}")]
    ToolsNotAvailable(String),

    /// An `ip` or `wg` invocation exited non-zero
    #[error("Tunnel command failed: {0}")]
    TransportCommand(String),

    /// The driver refused a peer or device configuration
    #[error("Configuration rejected for peer {peer}: {reason}")]
    ConfigurationRejected { peer: String, reason: String },

    /// Invalid CIDR notation
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Interface not found
    #[error("Tunnel interface '{0}' not found")]
    InterfaceNotFound(String),

    /// Interface has no usable address
    #[error("Tunnel interface '{0}' has no IPv4 address")]
    NoInterfaceAddress(String),

    /// Unparseable device state
    #[error("Failed to parse device state: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Permission denied
    #[error("Permission denied: {0}. This operation requires CAP_NET_ADMIN")]
    PermissionDenied(String),
}

impl OverlayError {
    /// Whether this error only affects a single peer entry
    pub fn is_configuration_rejected(&self) -> bool {
        matches!(
            self,
            OverlayError::ConfigurationRejected { .. } | OverlayError::InvalidKey(_)
        )
    }
}

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, OverlayError>;

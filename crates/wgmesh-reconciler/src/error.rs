//! Error types for the reconciliation loop

use thiserror::Error;
use wgmesh_directory::DirectoryError;
use wgmesh_overlay::OverlayError;

/// Errors raised by the mesh reconciler
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bootstrap stage could not complete
    #[error("Bootstrap failed while {stage}: {source}")]
    Bootstrap {
        stage: &'static str,
        #[source]
        source: Box<ReconcileError>,
    },

    /// Local tunnel device error
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    /// Directory or node metadata error
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A directory record cannot be turned into a tunnel peer
    #[error("Rejected record '{name}': {reason}")]
    RejectedRecord { name: String, reason: String },
}

impl ReconcileError {
    pub(crate) fn bootstrap(stage: &'static str, source: impl Into<ReconcileError>) -> Self {
        ReconcileError::Bootstrap {
            stage,
            source: Box::new(source.into()),
        }
    }

    pub(crate) fn rejected(name: &str, reason: impl Into<String>) -> Self {
        ReconcileError::RejectedRecord {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

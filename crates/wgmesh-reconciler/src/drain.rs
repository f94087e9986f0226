//! Best-effort teardown on termination

use std::fmt;
use tracing::{info, warn};
use wgmesh_directory::{DirectoryClient, RecordKind};
use wgmesh_overlay::TunnelDriver;

/// What happened to one resource during draining
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The resource existed and was removed
    Deleted,
    /// There was nothing to remove
    Absent,
    /// Removal failed; the error is kept for reporting only
    Failed(String),
}

impl DrainOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DrainOutcome::Failed(_))
    }
}

impl fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainOutcome::Deleted => write!(f, "deleted"),
            DrainOutcome::Absent => write!(f, "absent"),
            DrainOutcome::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Result of draining a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub interface: DrainOutcome,
    pub record: DrainOutcome,
}

impl DrainReport {
    /// Both deletions succeeded or had nothing to do
    pub fn is_clean(&self) -> bool {
        !self.interface.is_failed() && !self.record.is_failed()
    }
}

/// Delete the local interface and the node's own directory record.
///
/// Both deletions are always attempted; a failure of one never skips the
/// other, and neither failure is returned as an error.
pub async fn drain(
    tunnel: &dyn TunnelDriver,
    directory: &dyn DirectoryClient,
    interface: &str,
    kind: RecordKind,
) -> DrainReport {
    let interface_outcome = match tunnel.delete_interface(interface).await {
        Ok(true) => {
            info!(interface = %interface, "Deleted WireGuard interface");
            DrainOutcome::Deleted
        }
        Ok(false) => DrainOutcome::Absent,
        Err(e) => {
            warn!(interface = %interface, error = %e, "Failed to delete WireGuard interface");
            DrainOutcome::Failed(e.to_string())
        }
    };

    let record_outcome = match directory.delete_self_record(kind).await {
        Ok(true) => DrainOutcome::Deleted,
        Ok(false) => DrainOutcome::Absent,
        Err(e) => {
            warn!(
                name = %directory.identity(),
                kind = ?kind,
                error = %e,
                "Failed to delete self record"
            );
            DrainOutcome::Failed(e.to_string())
        }
    };

    DrainReport {
        interface: interface_outcome,
        record: record_outcome,
    }
}

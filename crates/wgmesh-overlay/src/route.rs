//! Kernel route programming for the gateway role

use crate::driver::TunnelDriver;
use crate::error::Result;
use ipnet::IpNet;
use std::sync::Arc;
use tracing::info;

/// Installs routes that send cluster traffic into the tunnel
pub struct RouteProgrammer {
    tunnel: Arc<dyn TunnelDriver>,
    interface: String,
}

impl RouteProgrammer {
    pub fn new(tunnel: Arc<dyn TunnelDriver>, interface: impl Into<String>) -> Self {
        Self {
            tunnel,
            interface: interface.into(),
        }
    }

    /// Route the cluster-wide pod range through the tunnel interface.
    ///
    /// A route that is already present counts as success.
    pub async fn ensure_pod_route(&self, pod_cidr: IpNet) -> Result<()> {
        // Normalise host bits away: 10.244.1.5/16 routes 10.244.0.0/16
        let destination = pod_cidr.trunc();
        self.tunnel.add_route(&self.interface, destination).await?;
        info!(interface = %self.interface, destination = %destination, "Pod range routed through tunnel");
        Ok(())
    }
}

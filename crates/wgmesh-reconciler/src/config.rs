//! Reconciler configuration

use crate::error::{ReconcileError, Result};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Port gateways listen on; agents dial it
pub const GATEWAY_LISTEN_PORT: u16 = 51820;

/// Port agents listen on; gateways dial it
pub const AGENT_LISTEN_PORT: u16 = 51821;

/// Default agent interface name
pub const AGENT_INTERFACE: &str = "wga";

/// Default gateway interface name
pub const GATEWAY_INTERFACE: &str = "wgg";

/// Default interval between steady-state ticks
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2);

/// Default mesh CIDR
pub const DEFAULT_MESH_CIDR: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(100, 255, 0, 0), 16);

/// Default gateway tunnel address
pub const DEFAULT_GATEWAY_ADDRESS: Ipv4Net =
    Ipv4Net::new_assert(Ipv4Addr::new(100, 255, 254, 4), 16);

const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Which side of the mesh this node is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Workload node; peers with every gateway
    Agent,
    /// Border node; peers with every agent and routes the pod range
    Gateway,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Agent => write!(f, "agent"),
            Role::Gateway => write!(f, "gateway"),
        }
    }
}

/// Everything a [`crate::MeshReconciler`] needs to know about its node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcilerConfig {
    /// Agent or gateway
    pub role: Role,

    /// Node name; also the name of this node's directory record
    pub node_name: String,

    /// WireGuard interface name
    pub interface: String,

    /// Local listen port
    pub listen_port: u16,

    /// Port remote peers listen on
    pub peer_port: u16,

    /// Mesh CIDR shared by every tunnel address
    #[serde(default = "ReconcilerConfig::default_mesh_cidr")]
    pub mesh_cidr: Ipv4Net,

    /// Tunnel address to assign; derived from the node IP when unset
    #[serde(default)]
    pub mesh_address: Option<IpNet>,

    /// Cluster pod range routed through the tunnel (gateway only)
    #[serde(default)]
    pub pod_cidr: Option<IpNet>,

    /// Address published as this node's endpoint; the node InternalIP when unset
    #[serde(default)]
    pub endpoint: Option<IpAddr>,

    /// Extra pod ranges published in the Peer record (agent only)
    #[serde(default)]
    pub advertise_cidrs: Vec<IpNet>,

    /// Publish the primary subnet from the node's NodeNetworkConfig (agent only)
    #[serde(default)]
    pub use_node_network_config: bool,

    /// Interval between steady-state ticks
    #[serde(default = "ReconcilerConfig::default_sync_interval")]
    pub sync_interval: Duration,

    /// Remove device peers that are no longer in the directory
    #[serde(default)]
    pub prune_stale_peers: bool,

    /// Persistent keepalive for configured peers
    #[serde(default)]
    pub persistent_keepalive: Option<Duration>,
}

impl ReconcilerConfig {
    fn default_mesh_cidr() -> Ipv4Net {
        DEFAULT_MESH_CIDR
    }

    fn default_sync_interval() -> Duration {
        DEFAULT_SYNC_INTERVAL
    }

    /// Agent defaults: `wga` on 51821, dialing gateways on 51820
    pub fn agent(node_name: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            node_name: node_name.into(),
            interface: AGENT_INTERFACE.to_string(),
            listen_port: AGENT_LISTEN_PORT,
            peer_port: GATEWAY_LISTEN_PORT,
            mesh_cidr: DEFAULT_MESH_CIDR,
            mesh_address: None,
            pod_cidr: None,
            endpoint: None,
            advertise_cidrs: Vec::new(),
            use_node_network_config: false,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            prune_stale_peers: false,
            persistent_keepalive: None,
        }
    }

    /// Gateway defaults: `wgg` on 51820, dialing agents on 51821
    pub fn gateway(node_name: impl Into<String>, pod_cidr: IpNet) -> Self {
        Self {
            role: Role::Gateway,
            interface: GATEWAY_INTERFACE.to_string(),
            listen_port: GATEWAY_LISTEN_PORT,
            peer_port: AGENT_LISTEN_PORT,
            mesh_address: Some(IpNet::V4(DEFAULT_GATEWAY_ADDRESS)),
            pod_cidr: Some(pod_cidr),
            ..Self::agent(node_name)
        }
    }

    /// Check the configuration for values the reconciler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "node name must not be empty".to_string(),
            ));
        }

        if self.interface.is_empty() || self.interface.len() > MAX_INTERFACE_NAME_LEN {
            return Err(ReconcileError::InvalidConfig(format!(
                "interface name '{}' must be 1-{} characters",
                self.interface, MAX_INTERFACE_NAME_LEN
            )));
        }

        if self.listen_port == 0 || self.peer_port == 0 {
            return Err(ReconcileError::InvalidConfig(
                "listen and peer ports must be non-zero".to_string(),
            ));
        }

        if self.sync_interval.is_zero() {
            return Err(ReconcileError::InvalidConfig(
                "sync interval must be greater than zero".to_string(),
            ));
        }

        if let Some(address) = self.mesh_address {
            match address {
                IpNet::V4(v4) if self.mesh_cidr.contains(&v4.addr()) => {}
                _ => {
                    return Err(ReconcileError::InvalidConfig(format!(
                        "mesh address {address} is outside mesh CIDR {}",
                        self.mesh_cidr
                    )))
                }
            }
        }

        if self.role == Role::Gateway && self.pod_cidr.is_none() {
            return Err(ReconcileError::InvalidConfig(
                "gateway role requires a pod CIDR".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults() {
        let agent = ReconcilerConfig::agent("node-a");
        assert_eq!(agent.interface, "wga");
        assert_eq!(agent.listen_port, 51821);
        assert_eq!(agent.peer_port, 51820);
        assert!(agent.mesh_address.is_none());
        assert!(agent.validate().is_ok());

        let gateway = ReconcilerConfig::gateway("gw1", "10.244.0.0/16".parse().unwrap());
        assert_eq!(gateway.role, Role::Gateway);
        assert_eq!(gateway.interface, "wgg");
        assert_eq!(gateway.listen_port, 51820);
        assert_eq!(gateway.peer_port, 51821);
        assert_eq!(
            gateway.mesh_address.unwrap().to_string(),
            "100.255.254.4/16"
        );
        assert!(gateway.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ReconcilerConfig::agent("");
        assert!(config.validate().is_err());

        config = ReconcilerConfig::agent("n");
        config.interface = "a-very-long-interface".to_string();
        assert!(config.validate().is_err());

        config = ReconcilerConfig::agent("n");
        config.sync_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config = ReconcilerConfig::agent("n");
        config.mesh_address = Some("10.0.0.1/24".parse().unwrap());
        assert!(config.validate().is_err());

        config = ReconcilerConfig::gateway("gw", "10.244.0.0/16".parse().unwrap());
        config.pod_cidr = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: ReconcilerConfig = serde_json::from_value(serde_json::json!({
            "role": "agent",
            "node_name": "node-a",
            "interface": "wga",
            "listen_port": 51821,
            "peer_port": 51820
        }))
        .unwrap();

        assert_eq!(config.mesh_cidr, DEFAULT_MESH_CIDR);
        assert_eq!(config.sync_interval, DEFAULT_SYNC_INTERVAL);
        assert!(!config.prune_stale_peers);
        assert!(config.validate().is_ok());
    }
}

//! Tunnel device configuration and observed state

use crate::keys::WgKey;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// A single peer entry to add or update on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer public key
    pub public_key: WgKey,

    /// Endpoint address
    pub endpoint: Option<SocketAddr>,

    /// Allowed IPs
    pub allowed_ips: Vec<IpNet>,

    /// Replace the peer's allowed IPs instead of appending to them
    #[serde(default = "default_true")]
    pub replace_allowed_ips: bool,

    /// Persistent keepalive interval
    #[serde(default)]
    pub persistent_keepalive: Option<Duration>,
}

fn default_true() -> bool {
    true
}

impl PeerConfig {
    /// Create a new peer entry that replaces any previous allowed IPs
    pub fn new(public_key: WgKey, endpoint: SocketAddr, allowed_ips: Vec<IpNet>) -> Self {
        Self {
            public_key,
            endpoint: Some(endpoint),
            allowed_ips,
            replace_allowed_ips: true,
            persistent_keepalive: None,
        }
    }

    /// Set the persistent keepalive interval
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.persistent_keepalive = Some(interval);
        self
    }

    /// Build the `peer ...` argument group for `wg set`
    pub fn to_wg_args(&self) -> Vec<String> {
        let mut args = vec!["peer".to_string(), self.public_key.to_base64()];

        if let Some(endpoint) = self.endpoint {
            args.push("endpoint".to_string());
            args.push(endpoint.to_string());
        }

        let prefix = if self.replace_allowed_ips { "" } else { "+" };
        let allowed = self
            .allowed_ips
            .iter()
            .map(|net| format!("{prefix}{net}"))
            .collect::<Vec<_>>()
            .join(",");
        args.push("allowed-ips".to_string());
        args.push(allowed);

        if let Some(keepalive) = self.persistent_keepalive {
            args.push("persistent-keepalive".to_string());
            args.push(keepalive.as_secs().to_string());
        }

        args
    }
}

/// A configuration change for the device; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Private key to install
    pub private_key: Option<WgKey>,

    /// Listen port to bind
    pub listen_port: Option<u16>,

    /// Peers to add or update (never replaces the full peer table)
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl DeviceConfig {
    /// Configuration that only installs identity
    pub fn identity(private_key: WgKey, listen_port: u16) -> Self {
        Self {
            private_key: Some(private_key),
            listen_port: Some(listen_port),
            peers: Vec::new(),
        }
    }

    /// Configuration that adds or updates a single peer
    pub fn peer(peer: PeerConfig) -> Self {
        Self {
            peers: vec![peer],
            ..Default::default()
        }
    }
}

/// A peer as reported by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePeer {
    pub public_key: WgKey,
    pub endpoint: Option<SocketAddr>,
    pub allowed_ips: Vec<IpNet>,
    pub last_handshake: Option<u64>,
}

/// Observed state of the WireGuard device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Interface name
    pub name: String,

    /// Installed private key, if any
    pub private_key: Option<WgKey>,

    /// Public key derived by the kernel from the private key
    pub public_key: Option<WgKey>,

    /// Bound listen port (0 when unset)
    pub listen_port: u16,

    /// Configured peers
    pub peers: Vec<DevicePeer>,
}

impl DeviceState {
    /// Look up a configured peer by key
    pub fn peer(&self, public_key: &WgKey) -> Option<&DevicePeer> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }
}

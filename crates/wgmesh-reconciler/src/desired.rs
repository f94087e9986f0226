//! Desired peer set, computed from directory listings
//!
//! Records are validated here. A malformed record (bad key, endpoint or
//! CIDR) is rejected on its own and never poisons the rest of the listing.
//! Public keys and mesh IPs are exclusive: the first record to claim one
//! wins and later claimants are rejected.

use crate::error::{ReconcileError, Result};
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;
use wgmesh_directory::{GatewayRecord, PeerRecord};
use wgmesh_overlay::{PeerConfig, WgKey};

/// One peer the local device should carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredPeer {
    /// Directory record name, for logging
    pub name: String,
    pub public_key: WgKey,
    pub endpoint: SocketAddr,
    pub allowed_ips: Vec<IpNet>,
    /// Published mesh IP (agents only)
    pub mesh_ip: Option<IpAddr>,
}

impl DesiredPeer {
    /// Peer entry for a gateway as seen from an agent
    pub fn from_gateway(record: &GatewayRecord, port: u16, mesh: Ipv4Net) -> Result<Self> {
        Ok(Self {
            name: record.name.clone(),
            public_key: parse_key(&record.name, &record.public_key)?,
            endpoint: parse_endpoint(&record.name, &record.endpoint, port)?,
            allowed_ips: vec![IpNet::V4(mesh)],
            mesh_ip: None,
        })
    }

    /// Peer entry for an agent as seen from a gateway.
    ///
    /// Allowed IPs are the declared pod ranges plus a host route to the
    /// agent's mesh IP, if it published one.
    pub fn from_peer(record: &PeerRecord, port: u16) -> Result<Self> {
        let public_key = parse_key(&record.name, &record.public_key)?;
        let endpoint = parse_endpoint(&record.name, &record.endpoint, port)?;

        let mut allowed_ips: Vec<IpNet> = Vec::new();
        for raw in &record.allowed_ips {
            let net = parse_cidr(&record.name, raw)?;
            if !allowed_ips.contains(&net) {
                allowed_ips.push(net);
            }
        }

        let mesh_ip = match &record.mesh_ip {
            Some(raw) => {
                let addr: IpAddr = raw.trim().parse().map_err(|_| {
                    ReconcileError::rejected(&record.name, format!("invalid mesh IP '{raw}'"))
                })?;
                let host = IpNet::from(addr);
                if !allowed_ips.contains(&host) {
                    allowed_ips.push(host);
                }
                Some(addr)
            }
            None => None,
        };

        Ok(Self {
            name: record.name.clone(),
            public_key,
            endpoint,
            allowed_ips,
            mesh_ip,
        })
    }

    /// Tunnel configuration for this peer
    pub fn to_peer_config(&self, keepalive: Option<Duration>) -> PeerConfig {
        let config = PeerConfig::new(self.public_key, self.endpoint, self.allowed_ips.clone());
        match keepalive {
            Some(interval) => config.with_keepalive(interval),
            None => config,
        }
    }
}

fn parse_key(name: &str, raw: &str) -> Result<WgKey> {
    raw.trim()
        .parse()
        .map_err(|e| ReconcileError::rejected(name, format!("invalid public key: {e}")))
}

fn parse_endpoint(name: &str, raw: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = raw
        .trim()
        .parse()
        .map_err(|_| ReconcileError::rejected(name, format!("invalid endpoint '{raw}'")))?;
    Ok(SocketAddr::new(ip, port))
}

fn parse_cidr(name: &str, raw: &str) -> Result<IpNet> {
    let raw = raw.trim();
    if let Ok(net) = raw.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    raw.parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| ReconcileError::rejected(name, format!("invalid allowed IP '{raw}'")))
}

/// The peers a node should carry, plus the records that could not be used
#[derive(Debug, Default)]
pub struct DesiredPeerSet {
    pub peers: Vec<DesiredPeer>,
    pub rejected: Vec<ReconcileError>,
}

impl DesiredPeerSet {
    /// Keys of every accepted peer
    pub fn keys(&self) -> impl Iterator<Item = &WgKey> {
        self.peers.iter().map(|p| &p.public_key)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn collect<R>(
        records: &[R],
        own_key: &WgKey,
        own_address: Option<IpAddr>,
        build: impl Fn(&R) -> Result<DesiredPeer>,
    ) -> Self {
        let mut set = DesiredPeerSet::default();
        let mut seen: HashSet<WgKey> = HashSet::new();
        let mut claimed: HashSet<IpAddr> = own_address.into_iter().collect();

        for record in records {
            let peer = match build(record) {
                Ok(peer) => peer,
                Err(e) => {
                    set.rejected.push(e);
                    continue;
                }
            };

            if peer.public_key == *own_key {
                debug!(name = %peer.name, "Skipping own record");
                continue;
            }

            if !seen.insert(peer.public_key) {
                set.rejected.push(ReconcileError::rejected(
                    &peer.name,
                    format!("duplicate public key {}", peer.public_key),
                ));
                continue;
            }

            if let Some(mesh_ip) = peer.mesh_ip {
                if !claimed.insert(mesh_ip) {
                    set.rejected.push(ReconcileError::rejected(
                        &peer.name,
                        format!("mesh IP {mesh_ip} is already in use"),
                    ));
                    continue;
                }
            }

            set.peers.push(peer);
        }

        set
    }

    /// Desired set for an agent: every gateway
    pub fn from_gateways(
        records: &[GatewayRecord],
        own_key: &WgKey,
        port: u16,
        mesh: Ipv4Net,
    ) -> Self {
        Self::collect(records, own_key, None, |r| {
            DesiredPeer::from_gateway(r, port, mesh)
        })
    }

    /// Desired set for a gateway: every agent.
    ///
    /// `own_address` is the gateway's tunnel address; an agent claiming it
    /// is rejected.
    pub fn from_peers(
        records: &[PeerRecord],
        own_key: &WgKey,
        own_address: Option<IpAddr>,
        port: u16,
    ) -> Self {
        Self::collect(records, own_key, own_address, |r| {
            DesiredPeer::from_peer(r, port)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> WgKey {
        WgKey::from_bytes([byte; 32])
    }

    fn gateway(name: &str, key: &WgKey, endpoint: &str) -> GatewayRecord {
        GatewayRecord {
            name: name.to_string(),
            public_key: key.to_base64(),
            endpoint: endpoint.to_string(),
        }
    }

    fn mesh() -> Ipv4Net {
        "100.255.0.0/16".parse().unwrap()
    }

    #[test]
    fn test_gateway_peer() {
        let record = gateway("gw1", &key(1), "10.0.0.5");
        let peer = DesiredPeer::from_gateway(&record, 51820, mesh()).unwrap();

        assert_eq!(peer.endpoint, "10.0.0.5:51820".parse().unwrap());
        assert_eq!(peer.allowed_ips, vec!["100.255.0.0/16".parse().unwrap()]);
    }

    #[test]
    fn test_agent_peer_allowed_ips() {
        let record = PeerRecord {
            name: "node-a".to_string(),
            public_key: key(2).to_base64(),
            endpoint: "10.224.0.4".to_string(),
            pod_ips: vec!["10.224.0.4".to_string()],
            mesh_ip: Some("100.255.0.4".to_string()),
            allowed_ips: vec![
                "10.244.1.0/24".to_string(),
                "10.244.1.7/24".to_string(),
                "10.244.9.9".to_string(),
            ],
        };

        let peer = DesiredPeer::from_peer(&record, 51821).unwrap();
        assert_eq!(peer.endpoint, "10.224.0.4:51821".parse().unwrap());
        let allowed: Vec<String> = peer.allowed_ips.iter().map(|n| n.to_string()).collect();
        assert_eq!(
            allowed,
            vec!["10.244.1.0/24", "10.244.9.9/32", "100.255.0.4/32"]
        );
    }

    #[test]
    fn test_malformed_records_rejected() {
        let bad_key = GatewayRecord {
            name: "gw-bad".to_string(),
            public_key: "not-base64!".to_string(),
            endpoint: "10.0.0.5".to_string(),
        };
        assert!(matches!(
            DesiredPeer::from_gateway(&bad_key, 51820, mesh()),
            Err(ReconcileError::RejectedRecord { .. })
        ));

        let bad_endpoint = gateway("gw", &key(1), "10.0.0.5:51820");
        assert!(DesiredPeer::from_gateway(&bad_endpoint, 51820, mesh()).is_err());

        let bad_cidr = PeerRecord {
            name: "node-a".to_string(),
            public_key: key(2).to_base64(),
            endpoint: "10.224.0.4".to_string(),
            allowed_ips: vec!["10.244.1.0/99".to_string()],
            ..Default::default()
        };
        assert!(DesiredPeer::from_peer(&bad_cidr, 51821).is_err());
    }

    #[test]
    fn test_set_skips_own_and_duplicate_keys() {
        let records = vec![
            gateway("gw1", &key(1), "10.0.0.5"),
            gateway("self", &key(9), "10.0.0.9"),
            gateway("gw1-copy", &key(1), "10.0.0.6"),
            gateway("broken", &key(2), "nope"),
            gateway("gw2", &key(3), "10.0.0.7"),
        ];

        let set = DesiredPeerSet::from_gateways(&records, &key(9), 51820, mesh());
        let names: Vec<&str> = set.peers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["gw1", "gw2"]);
        assert_eq!(set.peers[0].endpoint.ip().to_string(), "10.0.0.5");
        assert_eq!(set.rejected.len(), 2);
    }

    fn agent(name: &str, key: &WgKey, mesh_ip: &str) -> PeerRecord {
        PeerRecord {
            name: name.to_string(),
            public_key: key.to_base64(),
            endpoint: "10.224.0.4".to_string(),
            mesh_ip: Some(mesh_ip.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_rejects_claimed_mesh_ips() {
        let records = vec![
            agent("node-a", &key(1), "100.255.3.7"),
            agent("node-b", &key(2), "100.255.3.7"),
            agent("node-c", &key(3), "100.255.254.4"),
            agent("node-d", &key(4), "100.255.3.8"),
        ];
        let own: IpAddr = "100.255.254.4".parse().unwrap();

        let set = DesiredPeerSet::from_peers(&records, &key(9), Some(own), 51821);
        let names: Vec<&str> = set.peers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["node-a", "node-d"]);
        assert_eq!(set.rejected.len(), 2);
        assert!(set
            .rejected
            .iter()
            .all(|e| matches!(e, ReconcileError::RejectedRecord { .. })));
    }

    #[test]
    fn test_peer_config_keepalive() {
        let peer = DesiredPeer::from_gateway(&gateway("gw1", &key(1), "10.0.0.5"), 51820, mesh())
            .unwrap();
        assert!(peer.to_peer_config(None).persistent_keepalive.is_none());
        assert_eq!(
            peer.to_peer_config(Some(Duration::from_secs(25)))
                .persistent_keepalive,
            Some(Duration::from_secs(25))
        );
    }
}

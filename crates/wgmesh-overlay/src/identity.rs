//! Local tunnel identity: link, address, keypair and listen port
//!
//! Every operation here is idempotent so a restarted process can run them
//! against a device that outlived its predecessor.

use crate::driver::TunnelDriver;
use crate::error::{OverlayError, Result};
use crate::keys::WgKey;
use crate::config::DeviceConfig;
use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, info};

/// The local node's tunnel identity
#[derive(Debug, Clone, Serialize)]
pub struct NodeIdentity {
    /// WireGuard interface name
    pub interface: String,

    /// Public key (safe to publish)
    pub public_key: WgKey,

    /// Bound listen port
    pub listen_port: u16,

    #[serde(skip)]
    private_key: WgKey,
}

impl NodeIdentity {
    /// Private key installed on the device
    pub fn private_key(&self) -> &WgKey {
        &self.private_key
    }
}

/// Ensures the local WireGuard device exists and carries a stable identity
pub struct IdentityManager {
    tunnel: Arc<dyn TunnelDriver>,
    interface: String,
}

impl IdentityManager {
    /// Create a manager for the given interface
    pub fn new(tunnel: Arc<dyn TunnelDriver>, interface: impl Into<String>) -> Self {
        Self {
            tunnel,
            interface: interface.into(),
        }
    }

    /// Interface name this manager owns
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Create the link, give it an address and bring it up.
    ///
    /// If the link already carries an IPv4 address that address is kept,
    /// so a restart never stacks a second mesh address on the device.
    /// Returns the address in effect.
    pub async fn ensure_interface(&self, address: IpNet) -> Result<IpNet> {
        info!(interface = %self.interface, address = %address, "Ensuring WireGuard interface");

        self.tunnel.create_interface(&self.interface).await?;

        let existing = self.tunnel.interface_addresses(&self.interface).await?;
        let effective = match existing.iter().find(|net| net.addr().is_ipv4()) {
            Some(current) => {
                if *current != address {
                    debug!(
                        interface = %self.interface,
                        current = %current,
                        requested = %address,
                        "Interface already addressed, keeping existing address"
                    );
                }
                *current
            }
            None => {
                self.tunnel
                    .assign_address(&self.interface, address)
                    .await?;
                address
            }
        };

        self.tunnel.set_up(&self.interface).await?;
        info!(interface = %self.interface, address = %effective, "WireGuard interface up");
        Ok(effective)
    }

    /// Make sure the device has a private key and the expected listen port.
    ///
    /// A key is generated only when none is installed; an existing key is
    /// never replaced.
    pub async fn ensure_keypair(&self, listen_port: u16) -> Result<NodeIdentity> {
        let device = self.tunnel.device(&self.interface).await?;

        let private_key = match device.private_key {
            Some(key) => {
                if device.listen_port != listen_port {
                    info!(
                        interface = %self.interface,
                        from = device.listen_port,
                        to = listen_port,
                        "Updating listen port"
                    );
                    let config = DeviceConfig {
                        listen_port: Some(listen_port),
                        ..Default::default()
                    };
                    self.tunnel.configure(&self.interface, &config).await?;
                }
                key
            }
            None => {
                info!(interface = %self.interface, "Generating new private key for WireGuard device");
                let key = WgKey::generate_private();
                self.tunnel
                    .configure(&self.interface, &DeviceConfig::identity(key, listen_port))
                    .await?;
                key
            }
        };

        Ok(NodeIdentity {
            interface: self.interface.clone(),
            public_key: device.public_key.unwrap_or_else(|| private_key.public_key()),
            listen_port,
            private_key,
        })
    }

    /// The mesh address, read back from the interface.
    pub async fn mesh_ip(&self) -> Result<IpAddr> {
        self.tunnel
            .interface_addresses(&self.interface)
            .await?
            .into_iter()
            .find(|net| net.addr().is_ipv4())
            .map(|net| net.addr())
            .ok_or_else(|| OverlayError::NoInterfaceAddress(self.interface.clone()))
    }
}

/// Derive a stable mesh address for a node from its internal IP.
///
/// The host bits of `node_ip` (relative to the mesh prefix length) are
/// placed into `mesh`. Results that would land on the network or broadcast
/// address are nudged inward so the address is always a usable host. A
/// result listed in `reserved` moves to the next free host, wrapping
/// around the usable range.
pub fn derive_mesh_address(
    mesh: Ipv4Net,
    node_ip: Ipv4Addr,
    reserved: &[Ipv4Addr],
) -> Result<IpNet> {
    let host_bits = 32 - u32::from(mesh.prefix_len());
    if host_bits < 2 {
        return Err(OverlayError::InvalidCidr(format!(
            "{mesh} has no room for host addresses"
        )));
    }

    let host_mask = if host_bits == 32 {
        u32::MAX
    } else {
        (1u32 << host_bits) - 1
    };
    let mut host = u32::from(node_ip) & host_mask;
    if host == 0 {
        host = 1;
    } else if host == host_mask {
        host = host_mask - 1;
    }

    let network = u32::from(mesh.network());
    let usable = u64::from(host_mask) - 1;
    let mut attempts = 0u64;
    while reserved.contains(&Ipv4Addr::from(network | host)) {
        attempts += 1;
        if attempts >= usable {
            return Err(OverlayError::InvalidCidr(format!(
                "{mesh} has no unreserved host addresses"
            )));
        }
        host = if host + 1 >= host_mask { 1 } else { host + 1 };
    }

    let addr = Ipv4Addr::from(network | host);
    let net = Ipv4Net::new(addr, mesh.prefix_len())
        .map_err(|e| OverlayError::InvalidCidr(e.to_string()))?;
    Ok(IpNet::V4(net))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTunnel;

    fn manager() -> (Arc<InMemoryTunnel>, IdentityManager) {
        let tunnel = Arc::new(InMemoryTunnel::new());
        let manager = IdentityManager::new(tunnel.clone(), "wga");
        (tunnel, manager)
    }

    #[tokio::test]
    async fn test_ensure_interface_is_idempotent() {
        let (tunnel, manager) = manager();
        let addr: IpNet = "100.255.3.7/16".parse().unwrap();

        let first = manager.ensure_interface(addr).await.unwrap();
        let second = manager.ensure_interface(addr).await.unwrap();

        assert_eq!(first, addr);
        assert_eq!(second, addr);
        assert!(tunnel.is_up("wga"));
        assert_eq!(tunnel.interface_addresses("wga").await.unwrap(), vec![addr]);
    }

    #[tokio::test]
    async fn test_ensure_interface_keeps_existing_address() {
        let (tunnel, manager) = manager();
        let original: IpNet = "100.255.3.7/16".parse().unwrap();
        manager.ensure_interface(original).await.unwrap();

        let effective = manager
            .ensure_interface("100.255.9.9/16".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(effective, original);
        assert_eq!(
            tunnel.interface_addresses("wga").await.unwrap(),
            vec![original]
        );
        assert_eq!(
            manager.mesh_ip().await.unwrap(),
            "100.255.3.7".parse::<IpAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_ensure_keypair_is_idempotent() {
        let (tunnel, manager) = manager();
        manager
            .ensure_interface("100.255.3.7/16".parse().unwrap())
            .await
            .unwrap();

        let first = manager.ensure_keypair(51821).await.unwrap();
        let calls = tunnel.configure_calls();
        let second = manager.ensure_keypair(51821).await.unwrap();

        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.private_key(), second.private_key());
        assert_eq!(first.public_key, first.private_key().public_key());
        assert_eq!(tunnel.configure_calls(), calls, "second call must not reconfigure");

        let device = tunnel.device("wga").await.unwrap();
        assert_eq!(device.listen_port, 51821);
    }

    #[tokio::test]
    async fn test_ensure_keypair_fixes_listen_port_only() {
        let (tunnel, manager) = manager();
        manager
            .ensure_interface("100.255.3.7/16".parse().unwrap())
            .await
            .unwrap();
        let first = manager.ensure_keypair(51821).await.unwrap();
        let second = manager.ensure_keypair(51820).await.unwrap();

        assert_eq!(first.public_key, second.public_key);
        assert_eq!(tunnel.device("wga").await.unwrap().listen_port, 51820);
    }

    #[tokio::test]
    async fn test_mesh_ip_without_address() {
        let (tunnel, manager) = manager();
        tunnel.create_interface("wga").await.unwrap();
        assert!(matches!(
            manager.mesh_ip().await,
            Err(OverlayError::NoInterfaceAddress(_))
        ));
    }

    #[test]
    fn test_derive_mesh_address() {
        let mesh: Ipv4Net = "100.255.0.0/16".parse().unwrap();
        let derived = derive_mesh_address(mesh, "10.224.3.7".parse().unwrap(), &[]).unwrap();
        assert_eq!(derived.to_string(), "100.255.3.7/16");
    }

    #[test]
    fn test_derive_mesh_address_avoids_network_and_broadcast() {
        let mesh: Ipv4Net = "100.255.0.0/16".parse().unwrap();
        let low = derive_mesh_address(mesh, "10.1.0.0".parse().unwrap(), &[]).unwrap();
        let high = derive_mesh_address(mesh, "10.1.255.255".parse().unwrap(), &[]).unwrap();
        assert_eq!(low.addr().to_string(), "100.255.0.1");
        assert_eq!(high.addr().to_string(), "100.255.255.254");
    }

    #[test]
    fn test_derive_mesh_address_skips_reserved() {
        let mesh: Ipv4Net = "100.255.0.0/16".parse().unwrap();
        let gateway: Ipv4Addr = "100.255.254.4".parse().unwrap();

        let derived =
            derive_mesh_address(mesh, "10.224.254.4".parse().unwrap(), &[gateway]).unwrap();
        assert_eq!(derived.to_string(), "100.255.254.5/16");

        let wrapped = derive_mesh_address(
            mesh,
            "10.1.255.254".parse().unwrap(),
            &["100.255.255.254".parse().unwrap()],
        )
        .unwrap();
        assert_eq!(wrapped.addr().to_string(), "100.255.0.1");
    }

    #[test]
    fn test_derive_mesh_address_all_reserved() {
        let mesh: Ipv4Net = "100.255.0.0/30".parse().unwrap();
        let reserved: Vec<Ipv4Addr> = vec![
            "100.255.0.1".parse().unwrap(),
            "100.255.0.2".parse().unwrap(),
        ];
        assert!(derive_mesh_address(mesh, "10.0.0.1".parse().unwrap(), &reserved).is_err());
    }

    #[test]
    fn test_derive_mesh_address_rejects_tiny_network() {
        let mesh: Ipv4Net = "100.255.0.0/31".parse().unwrap();
        assert!(derive_mesh_address(mesh, "10.0.0.1".parse().unwrap(), &[]).is_err());
    }
}

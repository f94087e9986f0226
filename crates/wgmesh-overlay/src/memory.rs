//! In-memory tunnel driver
//!
//! Models the kernel device closely enough to exercise reconciliation:
//! idempotent link/address/route creation, one entry per public key, and
//! injectable rejections and failures.

use crate::config::{DeviceConfig, DevicePeer, DeviceState};
use crate::driver::TunnelDriver;
use crate::error::{OverlayError, Result};
use crate::keys::WgKey;
use async_trait::async_trait;
use ipnet::IpNet;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Default, Clone)]
struct Link {
    up: bool,
    addresses: Vec<IpNet>,
    private_key: Option<WgKey>,
    listen_port: u16,
    peers: BTreeMap<WgKey, DevicePeer>,
}

#[derive(Debug, Default)]
struct Inner {
    links: BTreeMap<String, Link>,
    routes: BTreeSet<(String, IpNet)>,
    rejected_keys: HashSet<WgKey>,
    fail_delete: bool,
    configure_calls: usize,
    peer_configure_calls: Vec<WgKey>,
}

/// A [`TunnelDriver`] that keeps all state in memory
#[derive(Debug, Default)]
pub struct InMemoryTunnel {
    inner: Mutex<Inner>,
}

impl InMemoryTunnel {
    /// Create an empty host with no links
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any `configure` call that touches this peer fail
    pub fn reject_peer(&self, public_key: WgKey) {
        self.inner.lock().rejected_keys.insert(public_key);
    }

    /// Make `delete_interface` fail
    pub fn fail_delete(&self, fail: bool) {
        self.inner.lock().fail_delete = fail;
    }

    /// Pre-populate a peer, as if configured by an earlier process
    pub fn insert_peer(&self, name: &str, peer: DevicePeer) {
        let mut inner = self.inner.lock();
        let link = inner.links.entry(name.to_string()).or_default();
        link.peers.insert(peer.public_key, peer);
    }

    /// Whether the link exists
    pub fn has_interface(&self, name: &str) -> bool {
        self.inner.lock().links.contains_key(name)
    }

    /// Whether the link is up
    pub fn is_up(&self, name: &str) -> bool {
        self.inner.lock().links.get(name).is_some_and(|l| l.up)
    }

    /// Installed routes through the link
    pub fn routes(&self, name: &str) -> Vec<IpNet> {
        self.inner
            .lock()
            .routes
            .iter()
            .filter(|(link, _)| link == name)
            .map(|(_, dst)| *dst)
            .collect()
    }

    /// Total number of `configure` calls
    pub fn configure_calls(&self) -> usize {
        self.inner.lock().configure_calls
    }

    /// Every peer key passed to `configure`, in call order
    pub fn configured_peer_keys(&self) -> Vec<WgKey> {
        self.inner.lock().peer_configure_calls.clone()
    }
}

#[async_trait]
impl TunnelDriver for InMemoryTunnel {
    async fn create_interface(&self, name: &str) -> Result<()> {
        self.inner.lock().links.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn interface_addresses(&self, name: &str) -> Result<Vec<IpNet>> {
        let inner = self.inner.lock();
        let link = inner
            .links
            .get(name)
            .ok_or_else(|| OverlayError::InterfaceNotFound(name.to_string()))?;
        Ok(link.addresses.clone())
    }

    async fn assign_address(&self, name: &str, address: IpNet) -> Result<()> {
        let mut inner = self.inner.lock();
        let link = inner
            .links
            .get_mut(name)
            .ok_or_else(|| OverlayError::InterfaceNotFound(name.to_string()))?;
        if !link.addresses.contains(&address) {
            link.addresses.push(address);
        }
        Ok(())
    }

    async fn set_up(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let link = inner
            .links
            .get_mut(name)
            .ok_or_else(|| OverlayError::InterfaceNotFound(name.to_string()))?;
        link.up = true;
        Ok(())
    }

    async fn device(&self, name: &str) -> Result<DeviceState> {
        let inner = self.inner.lock();
        let link = inner
            .links
            .get(name)
            .ok_or_else(|| OverlayError::InterfaceNotFound(name.to_string()))?;
        Ok(DeviceState {
            name: name.to_string(),
            private_key: link.private_key,
            public_key: link.private_key.map(|k| k.public_key()),
            listen_port: link.listen_port,
            peers: link.peers.values().cloned().collect(),
        })
    }

    async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.configure_calls += 1;
        inner
            .peer_configure_calls
            .extend(config.peers.iter().map(|p| p.public_key));

        if let Some(peer) = config
            .peers
            .iter()
            .find(|p| inner.rejected_keys.contains(&p.public_key))
        {
            return Err(OverlayError::ConfigurationRejected {
                peer: peer.public_key.to_base64(),
                reason: "Key is not the correct length or format".to_string(),
            });
        }

        let link = inner
            .links
            .get_mut(name)
            .ok_or_else(|| OverlayError::InterfaceNotFound(name.to_string()))?;

        if let Some(key) = config.private_key {
            link.private_key = Some(key);
        }
        if let Some(port) = config.listen_port {
            link.listen_port = port;
        }
        for peer in &config.peers {
            let entry = link.peers.entry(peer.public_key).or_insert(DevicePeer {
                public_key: peer.public_key,
                endpoint: None,
                allowed_ips: Vec::new(),
                last_handshake: None,
            });
            if peer.endpoint.is_some() {
                entry.endpoint = peer.endpoint;
            }
            if peer.replace_allowed_ips {
                entry.allowed_ips = peer.allowed_ips.clone();
            } else {
                for net in &peer.allowed_ips {
                    if !entry.allowed_ips.contains(net) {
                        entry.allowed_ips.push(*net);
                    }
                }
            }
        }
        Ok(())
    }

    async fn remove_peer(&self, name: &str, public_key: &WgKey) -> Result<()> {
        let mut inner = self.inner.lock();
        let link = inner
            .links
            .get_mut(name)
            .ok_or_else(|| OverlayError::InterfaceNotFound(name.to_string()))?;
        link.peers.remove(public_key);
        Ok(())
    }

    async fn delete_interface(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.fail_delete {
            return Err(OverlayError::TransportCommand(
                "Failed to delete WireGuard interface: Operation not permitted".to_string(),
            ));
        }
        inner.routes.retain(|(link, _)| link != name);
        Ok(inner.links.remove(name).is_some())
    }

    async fn add_route(&self, name: &str, destination: IpNet) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.links.contains_key(name) {
            return Err(OverlayError::InterfaceNotFound(name.to_string()));
        }
        inner.routes.insert((name.to_string(), destination));
        Ok(())
    }
}

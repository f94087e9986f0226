//! The tunnel driver seam
//!
//! Everything the reconciler needs from the host kernel goes through
//! [`TunnelDriver`]. [`crate::wireguard::KernelWireGuard`] talks to the real
//! kernel; [`crate::memory::InMemoryTunnel`] backs tests.

use crate::config::{DeviceConfig, DeviceState};
use crate::error::Result;
use crate::keys::WgKey;
use async_trait::async_trait;
use ipnet::IpNet;

/// Operations on a local WireGuard device and its routes
#[async_trait]
pub trait TunnelDriver: Send + Sync {
    /// Create a WireGuard link. An existing link is success.
    async fn create_interface(&self, name: &str) -> Result<()>;

    /// Addresses currently assigned to the link
    async fn interface_addresses(&self, name: &str) -> Result<Vec<IpNet>>;

    /// Assign an address to the link. An existing assignment is success.
    async fn assign_address(&self, name: &str, address: IpNet) -> Result<()>;

    /// Bring the link up
    async fn set_up(&self, name: &str) -> Result<()>;

    /// Read the device's keys, listen port and peer table
    async fn device(&self, name: &str) -> Result<DeviceState>;

    /// Apply a configuration change (add-or-update; never replaces the peer table)
    async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<()>;

    /// Remove a single peer from the device
    async fn remove_peer(&self, name: &str, public_key: &WgKey) -> Result<()>;

    /// Delete the link. Returns `false` if it did not exist.
    async fn delete_interface(&self, name: &str) -> Result<bool>;

    /// Route `destination` through the link. An existing route is success.
    async fn add_route(&self, name: &str, destination: IpNet) -> Result<()>;
}

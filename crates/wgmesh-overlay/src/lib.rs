//! wgmesh Overlay - kernel WireGuard device management
//!
//! Owns everything that touches the local host's tunnel: the WireGuard link,
//! its address, keypair and listen port, its peer table, and the routes that
//! point cluster traffic into it.
//!
//! # Modules
//!
//! - [`config`] - Device and peer configuration types
//! - [`driver`] - The [`TunnelDriver`] trait
//! - [`dump`] - Parsers for `wg show dump` and `ip -j addr` output
//! - [`error`] - Error types for overlay operations
//! - [`identity`] - Idempotent link and keypair bootstrap
//! - [`keys`] - WireGuard key type
//! - [`memory`] - In-memory driver for tests
//! - [`route`] - Kernel route programming (gateway role)
//! - [`wireguard`] - Kernel driver using `ip` and `wg`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wgmesh_overlay::{IdentityManager, KernelWireGuard};
//!
//! let tunnel = Arc::new(KernelWireGuard::new());
//! let identity = IdentityManager::new(tunnel, "wga");
//!
//! identity.ensure_interface("100.255.3.7/16".parse()?).await?;
//! let node = identity.ensure_keypair(51821).await?;
//! println!("Public key: {}", node.public_key);
//! ```

pub mod config;
pub mod driver;
pub mod dump;
pub mod error;
pub mod identity;
pub mod keys;
pub mod memory;
pub mod route;
pub mod wireguard;

pub use config::{DeviceConfig, DevicePeer, DeviceState, PeerConfig};
pub use driver::TunnelDriver;
pub use error::{OverlayError, Result};
pub use identity::{derive_mesh_address, IdentityManager, NodeIdentity};
pub use keys::WgKey;
pub use memory::InMemoryTunnel;
pub use route::RouteProgrammer;
pub use wireguard::KernelWireGuard;

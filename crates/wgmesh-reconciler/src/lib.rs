//! wgmesh Reconciler - convergence of the local tunnel with the directory
//!
//! Agents carry one peer per gateway; gateways carry one peer per agent.
//! [`MeshReconciler`] drives both roles through the same state machine and
//! consumes its collaborators through the [`wgmesh_overlay::TunnelDriver`],
//! [`wgmesh_directory::DirectoryClient`] and [`wgmesh_directory::NodeMetadata`]
//! traits.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use wgmesh_reconciler::{MeshReconciler, ReconcilerConfig};
//!
//! let config = ReconcilerConfig::agent("aks-node-0");
//! let reconciler = MeshReconciler::new(config, tunnel, directory, nodes)?;
//!
//! let (stop_tx, stop_rx) = watch::channel(false);
//! let report = reconciler.run(stop_rx).await?;
//! ```

pub mod cache;
pub mod config;
pub mod desired;
pub mod drain;
pub mod error;
pub mod reconciler;

pub use cache::AppliedPeerCache;
pub use config::{
    ReconcilerConfig, Role, AGENT_INTERFACE, AGENT_LISTEN_PORT, DEFAULT_GATEWAY_ADDRESS,
    DEFAULT_MESH_CIDR, DEFAULT_SYNC_INTERVAL, GATEWAY_INTERFACE, GATEWAY_LISTEN_PORT,
};
pub use desired::{DesiredPeer, DesiredPeerSet};
pub use drain::{DrainOutcome, DrainReport};
pub use error::{ReconcileError, Result};
pub use reconciler::{MeshReconciler, Phase, TickReport};

//! Control-plane directory for the WireGuard mesh
//!
//! Agents publish `Peer` records and gateways publish `Gateway` records as
//! Kubernetes custom resources; every node lists the records relevant to its
//! role and writes only the one named after itself.
//!
//! The [`DirectoryClient`] trait is the seam the reconciler consumes.
//! [`KubeDirectory`] talks to a cluster, [`InMemoryDirectory`] backs tests.
//! [`NodeMetadata`] resolves node addresses in the same way.

pub mod client;
pub mod crd;
pub mod error;
pub mod kubernetes;
pub mod memory;
pub mod node;
pub mod records;

pub use client::DirectoryClient;
pub use crd::{Gateway, GatewaySpec, Peer, PeerSpec, DEFAULT_NAMESPACE};
pub use error::{DirectoryError, Result};
pub use kubernetes::KubeDirectory;
pub use memory::InMemoryDirectory;
pub use node::{KubeNodeMetadata, NodeMetadata, StaticNodeMetadata};
pub use records::{GatewayRecord, PeerRecord, RecordKind, SelfRecord, UpsertOutcome};

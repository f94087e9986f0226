//! Directory records as seen by the reconciler
//!
//! These are the wire values of the Peer and Gateway objects, detached from
//! Kubernetes metadata. Values are kept as published strings; the reconciler
//! validates them when turning a record into tunnel configuration.

use crate::crd::{Gateway, GatewaySpec, Peer, PeerSpec};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// An agent's published tunnel identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub name: String,
    pub public_key: String,
    pub endpoint: String,
    pub pod_ips: Vec<String>,
    pub mesh_ip: Option<String>,
    pub allowed_ips: Vec<String>,
}

/// A gateway's published tunnel identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRecord {
    pub name: String,
    pub public_key: String,
    pub endpoint: String,
}

/// Which kind of record a node owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Peer,
    Gateway,
}

/// The record a node publishes about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfRecord {
    Peer(PeerRecord),
    Gateway(GatewayRecord),
}

impl SelfRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            SelfRecord::Peer(_) => RecordKind::Peer,
            SelfRecord::Gateway(_) => RecordKind::Gateway,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SelfRecord::Peer(p) => &p.name,
            SelfRecord::Gateway(g) => &g.name,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            SelfRecord::Peer(p) => &p.endpoint,
            SelfRecord::Gateway(g) => &g.endpoint,
        }
    }
}

/// Result of publishing a self record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed; one was created
    Created,
    /// A stale record existed and was updated in place
    Updated,
    /// The stored record already matched
    Unchanged,
}

impl PeerRecord {
    pub(crate) fn to_spec(&self) -> PeerSpec {
        PeerSpec {
            public_key: self.public_key.clone(),
            endpoint: self.endpoint.clone(),
            pod_ips: self.pod_ips.clone(),
            mesh_ip: self.mesh_ip.clone(),
            allowed_ips: self.allowed_ips.clone(),
        }
    }
}

impl GatewayRecord {
    pub(crate) fn to_spec(&self) -> GatewaySpec {
        GatewaySpec {
            public_key: self.public_key.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl From<&Peer> for PeerRecord {
    fn from(peer: &Peer) -> Self {
        Self {
            name: peer.name_any(),
            public_key: peer.spec.public_key.clone(),
            endpoint: peer.spec.endpoint.clone(),
            pod_ips: peer.spec.pod_ips.clone(),
            mesh_ip: peer.spec.mesh_ip.clone(),
            allowed_ips: peer.spec.allowed_ips.clone(),
        }
    }
}

impl From<&Gateway> for GatewayRecord {
    fn from(gateway: &Gateway) -> Self {
        Self {
            name: gateway.name_any(),
            public_key: gateway.spec.public_key.clone(),
            endpoint: gateway.spec.endpoint.clone(),
        }
    }
}

/// Overwrite the mutable fields of `existing` with `desired`.
///
/// Returns `true` when anything changed. Only the spec is touched, so
/// metadata written by the API server survives the update.
pub fn merge_peer_spec(existing: &mut PeerSpec, desired: &PeerSpec) -> bool {
    if existing == desired {
        return false;
    }
    *existing = desired.clone();
    true
}

/// Gateway counterpart of [`merge_peer_spec`]
pub fn merge_gateway_spec(existing: &mut GatewaySpec, desired: &GatewaySpec) -> bool {
    if existing == desired {
        return false;
    }
    *existing = desired.clone();
    true
}

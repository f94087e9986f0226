//! Peer and Gateway Custom Resource Definitions
//!
//! Both kinds live in the `aks.azure.com/v1alpha1` group and are namespaced
//! (by default in `kube-system`). Each node writes only the object named
//! after itself.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group for mesh records
pub const GROUP: &str = "aks.azure.com";

/// API version for mesh records
pub const VERSION: &str = "v1alpha1";

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "kube-system";

/// Specification for a Peer: an agent node's tunnel identity
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aks.azure.com",
    version = "v1alpha1",
    kind = "Peer",
    plural = "peers",
    namespaced,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".spec.endpoint"}"#,
    printcolumn = r#"{"name":"MeshIP","type":"string","jsonPath":".spec.meshIP"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct PeerSpec {
    /// WireGuard public key of the peer (base64, 32 bytes)
    #[serde(rename = "publicKey")]
    pub public_key: String,

    /// Address the gateway dials to reach this peer
    pub endpoint: String,

    /// Node addresses of the peer
    #[serde(rename = "podIPs", default)]
    pub pod_ips: Vec<String>,

    /// Mesh address assigned to the peer's tunnel interface
    #[serde(rename = "meshIP", default, skip_serializing_if = "Option::is_none")]
    pub mesh_ip: Option<String>,

    /// Pod ranges reachable through this peer (CIDR)
    #[serde(rename = "allowedIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_ips: Vec<String>,
}

/// Specification for a Gateway: a border node's tunnel identity
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aks.azure.com",
    version = "v1alpha1",
    kind = "Gateway",
    plural = "gateways",
    namespaced,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".spec.endpoint"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct GatewaySpec {
    /// WireGuard public key of the gateway (base64, 32 bytes)
    #[serde(rename = "publicKey")]
    pub public_key: String,

    /// Address agents dial to reach the gateway
    pub endpoint: String,
}

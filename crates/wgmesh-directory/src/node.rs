//! Node metadata lookups
//!
//! Resolves the address other nodes should dial to reach this one, and
//! optionally the node's primary pod subnet as published by Azure CNI in a
//! `NodeNetworkConfig` object.

use crate::error::{DirectoryError, Result};
use async_trait::async_trait;
use ipnet::IpNet;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::Client;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

/// API group of the Azure CNI NodeNetworkConfig resource
pub const NNC_GROUP: &str = "acn.azure.com";
/// API version of the Azure CNI NodeNetworkConfig resource
pub const NNC_VERSION: &str = "v1alpha";

/// Lookups against the cluster's node metadata service
#[async_trait]
pub trait NodeMetadata: Send + Sync {
    /// The node's InternalIP address
    async fn internal_ip(&self, node: &str) -> Result<IpAddr>;

    /// The node's primary pod subnet, if one is published
    async fn primary_subnet(&self, node: &str) -> Result<Option<IpNet>>;
}

/// Pick the first InternalIP out of a Node's status addresses
fn internal_ip_of(node_name: &str, node: &Node) -> Result<IpAddr> {
    let addresses = node
        .status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .ok_or_else(|| DirectoryError::NoInternalIp(node_name.to_string()))?;

    let address = addresses
        .iter()
        .find(|a| a.type_ == "InternalIP")
        .ok_or_else(|| DirectoryError::NoInternalIp(node_name.to_string()))?;

    address
        .address
        .parse()
        .map_err(|_| DirectoryError::InvalidRecord {
            name: node_name.to_string(),
            reason: format!("InternalIP '{}' is not an IP address", address.address),
        })
}

/// Parse a `primaryIP` value; a bare address becomes a host prefix
fn parse_primary_ip(name: &str, value: &str) -> Result<IpNet> {
    if let Ok(net) = value.parse::<IpNet>() {
        return Ok(net);
    }
    value
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| DirectoryError::InvalidRecord {
            name: name.to_string(),
            reason: format!("primaryIP '{value}' is neither an address nor a CIDR"),
        })
}

/// Extract `status.networkContainers[0].primaryIP` from a NodeNetworkConfig
fn primary_ip_of(name: &str, data: &serde_json::Value) -> Result<Option<IpNet>> {
    let primary = data
        .pointer("/status/networkContainers/0/primaryIP")
        .and_then(|v| v.as_str());
    match primary {
        Some(value) => parse_primary_ip(name, value).map(Some),
        None => Ok(None),
    }
}

/// [`NodeMetadata`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeNodeMetadata {
    nodes: Api<Node>,
    nncs: Option<Api<DynamicObject>>,
}

impl KubeNodeMetadata {
    /// Node lookups only; [`NodeMetadata::primary_subnet`] always returns `None`
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client),
            nncs: None,
        }
    }

    /// Also read `NodeNetworkConfig` objects from `namespace`
    pub fn with_node_network_config(client: Client, namespace: &str) -> Self {
        let resource = ApiResource {
            group: NNC_GROUP.to_string(),
            version: NNC_VERSION.to_string(),
            api_version: format!("{NNC_GROUP}/{NNC_VERSION}"),
            kind: "NodeNetworkConfig".to_string(),
            plural: "nodenetworkconfigs".to_string(),
        };
        Self {
            nodes: Api::all(client.clone()),
            nncs: Some(Api::namespaced_with(client, namespace, &resource)),
        }
    }
}

#[async_trait]
impl NodeMetadata for KubeNodeMetadata {
    async fn internal_ip(&self, node: &str) -> Result<IpAddr> {
        let object = self
            .nodes
            .get_opt(node)
            .await?
            .ok_or_else(|| DirectoryError::NodeNotFound(node.to_string()))?;
        let ip = internal_ip_of(node, &object)?;
        debug!(node = %node, internal_ip = %ip, "Resolved node InternalIP");
        Ok(ip)
    }

    async fn primary_subnet(&self, node: &str) -> Result<Option<IpNet>> {
        let Some(nncs) = &self.nncs else {
            return Ok(None);
        };
        let Some(nnc) = nncs.get_opt(node).await? else {
            debug!(node = %node, "No NodeNetworkConfig for node");
            return Ok(None);
        };
        primary_ip_of(node, &nnc.data)
    }
}

/// Fixed node metadata, for tests and for running outside a cluster
#[derive(Default)]
pub struct StaticNodeMetadata {
    ips: RwLock<HashMap<String, IpAddr>>,
    subnets: RwLock<HashMap<String, IpNet>>,
}

impl StaticNodeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, node: impl Into<String>, ip: IpAddr) -> Self {
        self.ips.write().insert(node.into(), ip);
        self
    }

    pub fn with_subnet(self, node: impl Into<String>, subnet: IpNet) -> Self {
        self.subnets.write().insert(node.into(), subnet);
        self
    }
}

#[async_trait]
impl NodeMetadata for StaticNodeMetadata {
    async fn internal_ip(&self, node: &str) -> Result<IpAddr> {
        self.ips
            .read()
            .get(node)
            .copied()
            .ok_or_else(|| DirectoryError::NodeNotFound(node.to_string()))
    }

    async fn primary_subnet(&self, node: &str) -> Result<Option<IpNet>> {
        Ok(self.subnets.read().get(node).copied())
    }
}

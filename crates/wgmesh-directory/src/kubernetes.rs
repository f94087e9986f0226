//! Kubernetes-backed directory
//!
//! Records are `Peer` and `Gateway` custom resources in a single namespace.
//! The client is an explicitly constructed value; nothing here is global.

use crate::client::DirectoryClient;
use crate::crd::{Gateway, Peer, DEFAULT_NAMESPACE};
use crate::error::{DirectoryError, Result};
use crate::records::{
    merge_gateway_spec, merge_peer_spec, GatewayRecord, PeerRecord, RecordKind, SelfRecord,
    UpsertOutcome,
};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::{debug, info};

/// [`DirectoryClient`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeDirectory {
    peers: Api<Peer>,
    gateways: Api<Gateway>,
    namespace: String,
    identity: String,
}

impl KubeDirectory {
    /// Bind a directory to `namespace` for the node `identity`
    pub fn new(client: Client, namespace: &str, identity: impl Into<String>) -> Self {
        Self {
            peers: Api::namespaced(client.clone(), namespace),
            gateways: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            identity: identity.into(),
        }
    }

    /// Bind to the default namespace (`kube-system`)
    pub fn in_default_namespace(client: Client, identity: impl Into<String>) -> Self {
        Self::new(client, DEFAULT_NAMESPACE, identity)
    }

    /// Namespace the records live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn upsert_peer(&self, record: &PeerRecord) -> Result<UpsertOutcome> {
        let desired = record.to_spec();
        match self.peers.get_opt(&self.identity).await? {
            None => {
                let mut peer = Peer::new(&self.identity, desired);
                peer.metadata.namespace = Some(self.namespace.clone());
                self.peers.create(&PostParams::default(), &peer).await?;
                info!(name = %self.identity, namespace = %self.namespace, "Created Peer record");
                Ok(UpsertOutcome::Created)
            }
            Some(mut existing) => {
                if !merge_peer_spec(&mut existing.spec, &desired) {
                    debug!(name = %self.identity, "Peer record already up to date");
                    return Ok(UpsertOutcome::Unchanged);
                }
                // replace() carries resourceVersion, so a concurrent writer yields 409
                self.peers
                    .replace(&self.identity, &PostParams::default(), &existing)
                    .await?;
                info!(name = %self.identity, namespace = %self.namespace, "Updated Peer record");
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    async fn upsert_gateway(&self, record: &GatewayRecord) -> Result<UpsertOutcome> {
        let desired = record.to_spec();
        match self.gateways.get_opt(&self.identity).await? {
            None => {
                let mut gateway = Gateway::new(&self.identity, desired);
                gateway.metadata.namespace = Some(self.namespace.clone());
                self.gateways.create(&PostParams::default(), &gateway).await?;
                info!(name = %self.identity, namespace = %self.namespace, "Created Gateway record");
                Ok(UpsertOutcome::Created)
            }
            Some(mut existing) => {
                if !merge_gateway_spec(&mut existing.spec, &desired) {
                    debug!(name = %self.identity, "Gateway record already up to date");
                    return Ok(UpsertOutcome::Unchanged);
                }
                self.gateways
                    .replace(&self.identity, &PostParams::default(), &existing)
                    .await?;
                info!(name = %self.identity, namespace = %self.namespace, "Updated Gateway record");
                Ok(UpsertOutcome::Updated)
            }
        }
    }
}

/// Map a delete result so that 404 means "nothing to delete"
fn absent_is_ok<T>(result: std::result::Result<T, kube::Error>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(e) => Err(DirectoryError::Kube(e)),
    }
}

#[async_trait]
impl DirectoryClient for KubeDirectory {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn gateways(&self) -> Result<Vec<GatewayRecord>> {
        let list = self.gateways.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(GatewayRecord::from).collect())
    }

    async fn peers(&self) -> Result<Vec<PeerRecord>> {
        let list = self.peers.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(PeerRecord::from).collect())
    }

    async fn upsert_self_record(&self, record: &SelfRecord) -> Result<UpsertOutcome> {
        match record {
            SelfRecord::Peer(peer) => self.upsert_peer(peer).await,
            SelfRecord::Gateway(gateway) => self.upsert_gateway(gateway).await,
        }
    }

    async fn delete_self_record(&self, kind: RecordKind) -> Result<bool> {
        let deleted = match kind {
            RecordKind::Peer => absent_is_ok(
                self.peers
                    .delete(&self.identity, &DeleteParams::default())
                    .await,
            )?,
            RecordKind::Gateway => absent_is_ok(
                self.gateways
                    .delete(&self.identity, &DeleteParams::default())
                    .await,
            )?,
        };
        if deleted {
            info!(name = %self.identity, kind = ?kind, "Deleted self record");
        } else {
            debug!(name = %self.identity, kind = ?kind, "Self record not found, nothing to delete");
        }
        Ok(deleted)
    }
}

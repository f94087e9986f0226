//! The mesh reconciliation loop
//!
//! One [`MeshReconciler`] runs per node. It bootstraps the local tunnel
//! device, then polls the directory at a fixed interval and adds every
//! desired peer whose key is not yet on the device. Ticks are strictly
//! sequential and termination is only observed between them.
//!
//! ```text
//! Bootstrapping ──► SteadyState ──► Draining
//!   interface         fetch           delete interface
//!   keypair           diff vs cache   delete self record
//!   route (gw)        configure
//!   seed cache        (prune)
//!   sync + publish
//! ```

use crate::cache::AppliedPeerCache;
use crate::config::{ReconcilerConfig, Role, DEFAULT_GATEWAY_ADDRESS};
use crate::desired::DesiredPeerSet;
use crate::drain::{self, DrainReport};
use crate::error::{ReconcileError, Result};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wgmesh_directory::{
    DirectoryClient, GatewayRecord, NodeMetadata, PeerRecord, RecordKind, SelfRecord,
};
use wgmesh_overlay::{
    derive_mesh_address, DeviceConfig, IdentityManager, NodeIdentity, RouteProgrammer,
    TunnelDriver, WgKey,
};

/// Lifecycle phase of a reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrapping,
    SteadyState,
    Draining,
}

/// What a single sync pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Keys configured on the device during this pass
    pub configured: Vec<WgKey>,
    /// Desired peers skipped because the cache already holds their key
    pub already_applied: usize,
    /// Records or peers rejected as malformed
    pub rejected: usize,
    /// Peers whose configuration failed for other reasons; retried next tick
    pub failed: usize,
    /// Keys removed from the device by stale-peer pruning
    pub pruned: Vec<WgKey>,
    /// Set when the directory could not be read and the tick was skipped
    pub directory_error: Option<String>,
}

impl TickReport {
    /// Whether the pass changed nothing on the device
    pub fn is_noop(&self) -> bool {
        self.configured.is_empty() && self.pruned.is_empty()
    }
}

/// Role-parameterized reconciler for one node
pub struct MeshReconciler {
    config: ReconcilerConfig,
    tunnel: Arc<dyn TunnelDriver>,
    directory: Arc<dyn DirectoryClient>,
    nodes: Arc<dyn NodeMetadata>,
    identity: IdentityManager,
    cache: AppliedPeerCache,
    phase: Phase,
    node: Option<NodeIdentity>,
    mesh_address: Option<IpNet>,
}

impl MeshReconciler {
    /// Build a reconciler. The directory client must be bound to the node name.
    pub fn new(
        config: ReconcilerConfig,
        tunnel: Arc<dyn TunnelDriver>,
        directory: Arc<dyn DirectoryClient>,
        nodes: Arc<dyn NodeMetadata>,
    ) -> Result<Self> {
        config.validate()?;
        if directory.identity() != config.node_name {
            return Err(ReconcileError::InvalidConfig(format!(
                "directory client is bound to '{}' but node name is '{}'",
                directory.identity(),
                config.node_name
            )));
        }

        let identity = IdentityManager::new(Arc::clone(&tunnel), config.interface.clone());
        Ok(Self {
            config,
            tunnel,
            directory,
            nodes,
            identity,
            cache: AppliedPeerCache::new(),
            phase: Phase::Bootstrapping,
            node: None,
            mesh_address: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn cache(&self) -> &AppliedPeerCache {
        &self.cache
    }

    /// Local identity, available once bootstrap has run
    pub fn node_identity(&self) -> Option<&NodeIdentity> {
        self.node.as_ref()
    }

    /// Tunnel address in effect, available once bootstrap has run
    pub fn mesh_address(&self) -> Option<IpNet> {
        self.mesh_address
    }

    fn record_kind(&self) -> RecordKind {
        match self.config.role {
            Role::Agent => RecordKind::Peer,
            Role::Gateway => RecordKind::Gateway,
        }
    }

    /// Address other nodes dial: the configured endpoint or the node InternalIP
    async fn resolve_endpoint(&self) -> Result<IpAddr> {
        if let Some(endpoint) = self.config.endpoint {
            return Ok(endpoint);
        }
        Ok(self.nodes.internal_ip(&self.config.node_name).await?)
    }

    fn interface_address(&self, node_ip: IpAddr) -> Result<IpNet> {
        if let Some(address) = self.config.mesh_address {
            return Ok(address);
        }
        match node_ip {
            IpAddr::V4(v4) => Ok(derive_mesh_address(
                self.config.mesh_cidr,
                v4,
                &[DEFAULT_GATEWAY_ADDRESS.addr()],
            )?),
            IpAddr::V6(_) => Err(ReconcileError::InvalidConfig(format!(
                "cannot derive an IPv4 mesh address from {node_ip}; set a mesh address"
            ))),
        }
    }

    /// Run the bootstrap phase once.
    ///
    /// Any failure is fatal apart from individual peers being rejected.
    pub async fn bootstrap(&mut self) -> Result<TickReport> {
        info!(
            role = %self.config.role,
            node = %self.config.node_name,
            interface = %self.config.interface,
            "Bootstrapping mesh node"
        );

        let endpoint = self
            .resolve_endpoint()
            .await
            .map_err(|e| ReconcileError::bootstrap("resolving the node endpoint", e))?;

        let requested = self
            .interface_address(endpoint)
            .map_err(|e| ReconcileError::bootstrap("choosing the tunnel address", e))?;
        let address = self
            .identity
            .ensure_interface(requested)
            .await
            .map_err(|e| ReconcileError::bootstrap("creating the interface", e))?;
        self.mesh_address = Some(address);

        let node = self
            .identity
            .ensure_keypair(self.config.listen_port)
            .await
            .map_err(|e| ReconcileError::bootstrap("installing the keypair", e))?;
        info!(
            interface = %node.interface,
            public_key = %node.public_key,
            listen_port = node.listen_port,
            mesh_address = %address,
            "Tunnel identity ready"
        );

        if self.config.role == Role::Gateway {
            if let Some(pod_cidr) = self.config.pod_cidr {
                RouteProgrammer::new(Arc::clone(&self.tunnel), self.config.interface.clone())
                    .ensure_pod_route(pod_cidr)
                    .await
                    .map_err(|e| ReconcileError::bootstrap("installing the pod route", e))?;
            }
        }

        let device = self
            .tunnel
            .device(&self.config.interface)
            .await
            .map_err(|e| ReconcileError::bootstrap("reading device peers", e))?;
        self.cache = AppliedPeerCache::seeded_from(&device);
        debug!(seeded = self.cache.len(), "Seeded applied peer cache from device");

        let own_key = node.public_key;
        self.node = Some(node);

        let desired = self
            .fetch_desired(&own_key)
            .await
            .map_err(|e| ReconcileError::bootstrap("listing the directory", e))?;
        let report = self.apply(desired, true).await?;

        let record = self
            .self_record(&own_key, endpoint, address)
            .await
            .map_err(|e| ReconcileError::bootstrap("building the self record", e))?;
        let outcome = self
            .directory
            .upsert_self_record(&record)
            .await
            .map_err(|e| ReconcileError::bootstrap("publishing the self record", e))?;
        info!(name = %self.config.node_name, outcome = ?outcome, "Published self record");

        self.phase = Phase::SteadyState;
        Ok(report)
    }

    async fn self_record(&self, key: &WgKey, endpoint: IpAddr, address: IpNet) -> Result<SelfRecord> {
        let record = match self.config.role {
            Role::Gateway => SelfRecord::Gateway(GatewayRecord {
                name: self.config.node_name.clone(),
                public_key: key.to_base64(),
                endpoint: endpoint.to_string(),
            }),
            Role::Agent => {
                let mut allowed: Vec<IpNet> = self.config.advertise_cidrs.clone();
                if self.config.use_node_network_config {
                    match self.nodes.primary_subnet(&self.config.node_name).await? {
                        Some(subnet) if !allowed.contains(&subnet) => allowed.push(subnet),
                        Some(_) => {}
                        None => warn!(
                            node = %self.config.node_name,
                            "No primary subnet published for node"
                        ),
                    }
                }

                SelfRecord::Peer(PeerRecord {
                    name: self.config.node_name.clone(),
                    public_key: key.to_base64(),
                    endpoint: endpoint.to_string(),
                    pod_ips: vec![endpoint.to_string()],
                    mesh_ip: Some(address.addr().to_string()),
                    allowed_ips: allowed.iter().map(|n| n.to_string()).collect(),
                })
            }
        };
        Ok(record)
    }

    async fn fetch_desired(&self, own_key: &WgKey) -> Result<DesiredPeerSet> {
        let set = match self.config.role {
            Role::Agent => {
                let gateways = self.directory.gateways().await?;
                DesiredPeerSet::from_gateways(
                    &gateways,
                    own_key,
                    self.config.peer_port,
                    self.config.mesh_cidr,
                )
            }
            Role::Gateway => {
                let peers = self.directory.peers().await?;
                let own_address = self.mesh_address.map(|net| net.addr());
                DesiredPeerSet::from_peers(&peers, own_key, own_address, self.config.peer_port)
            }
        };
        Ok(set)
    }

    /// Configure every desired peer missing from the cache.
    ///
    /// With `strict`, a non-rejection driver failure aborts the pass.
    /// Otherwise it is logged and the peer is retried on the next tick.
    async fn apply(&mut self, desired: DesiredPeerSet, strict: bool) -> Result<TickReport> {
        let mut report = TickReport::default();

        for rejection in &desired.rejected {
            warn!(error = %rejection, "Skipping directory record");
            report.rejected += 1;
        }

        for peer in &desired.peers {
            if self.cache.contains(&peer.public_key) {
                report.already_applied += 1;
                continue;
            }

            let config = DeviceConfig::peer(peer.to_peer_config(self.config.persistent_keepalive));
            match self.tunnel.configure(&self.config.interface, &config).await {
                Ok(()) => {
                    info!(
                        name = %peer.name,
                        peer_key = %peer.public_key,
                        endpoint = %peer.endpoint,
                        allowed_ips = ?peer.allowed_ips,
                        "Configured peer"
                    );
                    self.cache.insert(peer.public_key);
                    report.configured.push(peer.public_key);
                }
                Err(e) if e.is_configuration_rejected() => {
                    warn!(name = %peer.name, peer_key = %peer.public_key, error = %e, "Peer configuration rejected");
                    report.rejected += 1;
                }
                Err(e) if strict => return Err(ReconcileError::bootstrap("configuring peers", e)),
                Err(e) => {
                    warn!(name = %peer.name, peer_key = %peer.public_key, error = %e, "Failed to configure peer");
                    report.failed += 1;
                }
            }
        }

        if self.config.prune_stale_peers {
            for key in self.cache.stale(desired.keys()) {
                match self.tunnel.remove_peer(&self.config.interface, &key).await {
                    Ok(()) => {
                        info!(peer_key = %key, "Removed stale peer");
                        self.cache.remove(&key);
                        report.pruned.push(key);
                    }
                    Err(e) => {
                        warn!(peer_key = %key, error = %e, "Failed to remove stale peer");
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// One steady-state pass. Never fails: a directory error skips the tick.
    pub async fn tick(&mut self) -> TickReport {
        let Some(own_key) = self.node.as_ref().map(|n| n.public_key) else {
            warn!("Tick requested before bootstrap, skipping");
            return TickReport::default();
        };

        let desired = match self.fetch_desired(&own_key).await {
            Ok(desired) => desired,
            Err(e) => {
                warn!(error = %e, "Directory unavailable, skipping tick");
                return TickReport {
                    directory_error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let report = self.apply(desired, false).await.unwrap_or_else(|e| {
            warn!(error = %e, "Tick failed");
            TickReport::default()
        });
        if !report.is_noop() {
            info!(
                configured = report.configured.len(),
                pruned = report.pruned.len(),
                "Tick applied changes"
            );
        }
        report
    }

    /// Tear down the interface and the self record
    pub async fn drain(&mut self) -> DrainReport {
        self.phase = Phase::Draining;
        info!(node = %self.config.node_name, "Draining mesh node");
        let report = drain::drain(
            self.tunnel.as_ref(),
            self.directory.as_ref(),
            &self.config.interface,
            self.record_kind(),
        )
        .await;
        info!(
            interface = %report.interface,
            record = %report.record,
            "Drain complete"
        );
        report
    }

    /// Bootstrap, tick until `shutdown` turns true (or its sender goes away),
    /// then drain.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<DrainReport> {
        self.bootstrap().await?;

        info!(
            interval_ms = self.config.sync_interval.as_millis() as u64,
            "Starting mesh reconcile loop"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.sync_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        info!("Termination requested");
                        break;
                    }
                    continue;
                }
            }
            self.tick().await;
        }

        Ok(self.drain().await)
    }
}

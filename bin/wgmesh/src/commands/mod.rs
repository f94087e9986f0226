pub(crate) mod agent;
pub(crate) mod crds;
pub(crate) mod gateway;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};
use wgmesh_directory::{KubeDirectory, KubeNodeMetadata, NodeMetadata};
use wgmesh_overlay::KernelWireGuard;
use wgmesh_reconciler::{MeshReconciler, ReconcilerConfig};

/// Wire the kernel driver and the Kubernetes directory into a reconciler
/// and run it until SIGTERM or SIGINT.
pub(crate) async fn run_reconciler(
    config: ReconcilerConfig,
    namespace: &str,
    use_node_network_config: bool,
) -> Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let directory = Arc::new(KubeDirectory::new(
        client.clone(),
        namespace,
        config.node_name.clone(),
    ));
    let nodes: Arc<dyn NodeMetadata> = if use_node_network_config {
        Arc::new(KubeNodeMetadata::with_node_network_config(client, namespace))
    } else {
        Arc::new(KubeNodeMetadata::new(client))
    };
    let tunnel = Arc::new(KernelWireGuard::new());

    let role = config.role;
    let reconciler = MeshReconciler::new(config, tunnel, directory, nodes)
        .context("Invalid reconciler configuration")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Ctrl+C handler failed");
                }
            }
            _ = terminate.recv() => {}
        }
        info!("Shutdown signal received, draining");
        let _ = stop_tx.send(true);
    });

    let report = reconciler
        .run(stop_rx)
        .await
        .with_context(|| format!("{role} failed"))?;

    if report.is_clean() {
        info!("Shutdown complete");
    } else {
        warn!(
            interface = %report.interface,
            record = %report.record,
            "Shutdown finished with cleanup errors"
        );
    }
    Ok(())
}

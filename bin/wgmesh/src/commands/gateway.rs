use crate::cli::GatewayArgs;
use anyhow::Result;
use tracing::info;

pub(crate) async fn gateway(args: GatewayArgs) -> Result<()> {
    let config = args.to_config();
    info!(
        node = %config.node_name,
        namespace = %args.common.namespace,
        interface = %config.interface,
        pod_cidr = %args.pod_cidr,
        "Starting wgmesh gateway"
    );
    super::run_reconciler(config, &args.common.namespace, false).await
}

use crate::cli::AgentArgs;
use anyhow::Result;
use tracing::info;

pub(crate) async fn agent(args: AgentArgs) -> Result<()> {
    let config = args.to_config();
    info!(
        node = %config.node_name,
        namespace = %args.common.namespace,
        interface = %config.interface,
        "Starting wgmesh agent"
    );
    super::run_reconciler(config, &args.common.namespace, args.use_node_network_config).await
}

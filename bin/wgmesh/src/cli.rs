use clap::{Args, Parser, Subcommand, ValueEnum};
use ipnet::{IpNet, Ipv4Net};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use wgmesh_directory::DEFAULT_NAMESPACE;
use wgmesh_reconciler::{ReconcilerConfig, DEFAULT_MESH_CIDR};

/// WireGuard mesh between cluster agents and gateways
#[derive(Parser)]
#[command(name = "wgmesh")]
#[command(version, about = "Self-organizing WireGuard mesh for Kubernetes nodes")]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Console log format; defaults to pretty on a terminal and json otherwise
    #[arg(long, value_enum, global = true)]
    pub(crate) log_format: Option<LogFormatArg>,

    /// Also write JSON logs to rolling files in this directory
    #[arg(long, env = "WGMESH_LOG_DIR", global = true)]
    pub(crate) log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run on a workload node and peer with every gateway
    Agent(AgentArgs),

    /// Run on a border node, peer with every agent and route the pod range
    Gateway(GatewayArgs),

    /// Print the Peer and Gateway CustomResourceDefinitions as YAML
    Crds,
}

/// Flags shared by both roles
#[derive(Args, Debug, Clone)]
pub(crate) struct CommonArgs {
    /// Name of this node; also the name of its directory record
    #[arg(long, env = "NODE_NAME")]
    pub(crate) node_name: String,

    /// Namespace holding Peer and Gateway records
    #[arg(long, env = "WGMESH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub(crate) namespace: String,

    /// WireGuard interface name (defaults: wga for agents, wgg for gateways)
    #[arg(long)]
    pub(crate) interface: Option<String>,

    /// Mesh CIDR shared by all tunnel addresses
    #[arg(long, default_value_t = DEFAULT_MESH_CIDR)]
    pub(crate) mesh_cidr: Ipv4Net,

    /// Tunnel address to assign (CIDR form); an address already on the interface wins
    #[arg(long)]
    pub(crate) mesh_address: Option<IpNet>,

    /// Seconds between directory polls
    #[arg(long, default_value_t = 2)]
    pub(crate) sync_interval: u64,

    /// Remove device peers whose records have left the directory
    #[arg(long)]
    pub(crate) prune_stale_peers: bool,

    /// Persistent keepalive in seconds for configured peers
    #[arg(long)]
    pub(crate) persistent_keepalive: Option<u64>,
}

impl CommonArgs {
    fn apply(&self, config: &mut ReconcilerConfig) {
        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        config.mesh_cidr = self.mesh_cidr;
        if self.mesh_address.is_some() {
            config.mesh_address = self.mesh_address;
        }
        config.sync_interval = Duration::from_secs(self.sync_interval);
        config.prune_stale_peers = self.prune_stale_peers;
        config.persistent_keepalive = self.persistent_keepalive.map(Duration::from_secs);
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct AgentArgs {
    #[command(flatten)]
    pub(crate) common: CommonArgs,

    /// Endpoint published for gateways to dial (defaults to the node InternalIP)
    #[arg(long)]
    pub(crate) endpoint: Option<IpAddr>,

    /// Pod range reachable through this node; may be repeated
    #[arg(long = "advertise-cidr")]
    pub(crate) advertise_cidrs: Vec<IpNet>,

    /// Also advertise the primary subnet from the node's Azure NodeNetworkConfig
    #[arg(long)]
    pub(crate) use_node_network_config: bool,
}

impl AgentArgs {
    pub(crate) fn to_config(&self) -> ReconcilerConfig {
        let mut config = ReconcilerConfig::agent(self.common.node_name.clone());
        self.common.apply(&mut config);
        config.endpoint = self.endpoint;
        config.advertise_cidrs = self.advertise_cidrs.clone();
        config.use_node_network_config = self.use_node_network_config;
        config
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct GatewayArgs {
    #[command(flatten)]
    pub(crate) common: CommonArgs,

    /// Cluster pod range routed through the tunnel
    #[arg(long)]
    pub(crate) pod_cidr: IpNet,

    /// Endpoint published for agents to dial (defaults to the node InternalIP)
    #[arg(long)]
    pub(crate) gateway_endpoint: Option<IpAddr>,
}

impl GatewayArgs {
    pub(crate) fn to_config(&self) -> ReconcilerConfig {
        let mut config = ReconcilerConfig::gateway(self.common.node_name.clone(), self.pod_cidr);
        self.common.apply(&mut config);
        config.endpoint = self.gateway_endpoint;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use wgmesh_reconciler::Role;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_agent_args() {
        let cli = Cli::parse_from([
            "wgmesh",
            "-v",
            "agent",
            "--node-name",
            "aks-node-0",
            "--advertise-cidr",
            "10.244.1.0/24",
            "--advertise-cidr",
            "10.244.2.0/24",
            "--prune-stale-peers",
        ]);
        assert_eq!(cli.verbose, 1);

        let Commands::Agent(args) = cli.command else {
            panic!("expected agent command");
        };
        assert_eq!(args.common.namespace, "kube-system");

        let config = args.to_config();
        assert_eq!(config.role, Role::Agent);
        assert_eq!(config.interface, "wga");
        assert_eq!(config.advertise_cidrs.len(), 2);
        assert!(config.prune_stale_peers);
        assert!(config.mesh_address.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gateway_args() {
        let cli = Cli::parse_from([
            "wgmesh",
            "gateway",
            "--node-name",
            "gw1",
            "--pod-cidr",
            "10.244.0.0/16",
            "--gateway-endpoint",
            "20.1.2.3",
            "--sync-interval",
            "5",
        ]);

        let Commands::Gateway(args) = cli.command else {
            panic!("expected gateway command");
        };
        let config = args.to_config();
        assert_eq!(config.role, Role::Gateway);
        assert_eq!(config.interface, "wgg");
        assert_eq!(config.endpoint, Some("20.1.2.3".parse().unwrap()));
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(
            config.mesh_address.unwrap().to_string(),
            "100.255.254.4/16"
        );
    }

    #[test]
    fn test_gateway_requires_pod_cidr() {
        let result = Cli::try_parse_from(["wgmesh", "gateway", "--node-name", "gw1"]);
        assert!(result.is_err());
    }
}

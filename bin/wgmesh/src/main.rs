//! wgmesh -- WireGuard mesh between Kubernetes agents and gateways.
//!
//! `wgmesh agent` runs on workload nodes, `wgmesh gateway` on border nodes;
//! both publish their tunnel identity as a custom resource and peer with the
//! other side. `wgmesh crds` prints the resource definitions.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;

use cli::{Cli, Commands, LogFormatArg};
use wgmesh_observability::{init_logging, FileLoggingConfig, LogFormat, LogLevel, LoggingConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Plain output, no logging or runtime needed
    if matches!(cli.command, Commands::Crds) {
        return match commands::crds::crds() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let _log_guard = match init_logging(&logging_config(&cli))
        .context("Failed to initialize logging")
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
    {
        Ok(rt) => match rt.block_on(run(cli)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "wgmesh exited with an error");
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn logging_config(cli: &Cli) -> LoggingConfig {
    let format = match cli.log_format {
        Some(LogFormatArg::Pretty) => LogFormat::Pretty,
        Some(LogFormatArg::Json) => LogFormat::Json,
        Some(LogFormatArg::Compact) => LogFormat::Compact,
        None if std::io::stdout().is_terminal() => LogFormat::Pretty,
        None => LogFormat::Json,
    };

    LoggingConfig {
        level: LogLevel::from_verbosity(cli.verbose),
        format,
        file: cli.log_dir.as_ref().map(|dir| FileLoggingConfig {
            directory: dir.clone(),
            prefix: "wgmesh".to_string(),
            rotation: Default::default(),
        }),
        ..Default::default()
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Agent(args) => commands::agent::agent(args).await,
        Commands::Gateway(args) => commands::gateway::gateway(args).await,
        Commands::Crds => commands::crds::crds(),
    }
}

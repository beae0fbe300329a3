use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use infra_core::default_driver_socket;
use infra_driver::{DriverConfig, MachineLayout, run_driver};
use tracing_subscriber::EnvFilter;

/// CLI arguments for a machine driver process.
#[derive(Debug, Parser)]
#[command(name = "infra-driver", about = "Reference machine driver")]
struct Args {
    /// Relay socket to register on.
    #[arg(long, env = "INFRA_DRIVER_SOCKET")]
    driver_socket: Option<PathBuf>,
    /// Provider name announced at registration.
    #[arg(long, default_value = "azure")]
    provider: String,
    /// Resource group encoded into provider IDs.
    #[arg(long, default_value = "default")]
    resource_group: String,
    /// JSON file with the data disks and volumes of each machine.
    #[arg(long)]
    layout: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("infra-driver error: {err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let socket = args.driver_socket.unwrap_or_else(default_driver_socket);
    let layout = match &args.layout {
        Some(path) => MachineLayout::load(path)?,
        None => MachineLayout::default(),
    };

    tracing::info!(
        provider = %args.provider,
        resource_group = %args.resource_group,
        data_disks = layout.data_disks.len(),
        volumes = layout.volumes.len(),
        "starting infra-driver"
    );

    let config = DriverConfig {
        provider: args.provider,
        resource_group: args.resource_group,
        layout,
    };
    run_driver(&socket, config).await?;
    Ok(())
}

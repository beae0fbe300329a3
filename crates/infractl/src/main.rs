use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, Subcommand};
use infra_core::{ErrorCode, MachineId, MachineRef, Request, Response, default_control_socket};
use infra_ipc::ControlClient;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "infractl", about = "Machine driver relay CLI")]
struct Cli {
    #[arg(long, env = "INFRA_CONTROL_SOCKET")]
    socket: Option<PathBuf>,
    /// Seconds to wait for the daemon before giving up.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print responses as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Version,
    Health,
    /// List registered drivers.
    Drivers,
    /// Create a machine through its provider driver.
    Create(MachineArgs),
    /// Delete a machine through its provider driver.
    Delete(MachineArgs),
}

#[derive(Debug, clap::Args)]
struct MachineArgs {
    #[arg(long)]
    provider: String,
    #[arg(long = "class")]
    machine_class: String,
    #[arg(long)]
    machine_id: String,
}

impl From<MachineArgs> for MachineRef {
    fn from(args: MachineArgs) -> Self {
        Self {
            provider: args.provider,
            machine_class: args.machine_class,
            machine_id: MachineId(args.machine_id),
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Ipc(#[from] infra_ipc::IpcError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("daemon error [{code:?}]: {message}{detail}")]
    Daemon {
        code: ErrorCode,
        message: String,
        detail: String,
    },
    #[error("driver failed {command} with code {error}")]
    Driver { command: &'static str, error: i32 },
    #[error("unexpected response for {command}: {response:?}")]
    Unexpected {
        command: &'static str,
        response: Box<Response>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(default_control_socket);

    let mut client = ControlClient::connect(&socket).await?;
    if let Some(secs) = cli.timeout_secs {
        client = client.with_timeout(Duration::from_secs(secs));
    }

    let (command, request) = match cli.command {
        Command::Version => ("version", Request::Version {}),
        Command::Health => ("health", Request::Health {}),
        Command::Drivers => ("drivers", Request::ListDrivers {}),
        Command::Create(args) => (
            "create",
            Request::CreateMachine {
                machine: args.into(),
            },
        ),
        Command::Delete(args) => (
            "delete",
            Request::DeleteMachine {
                machine: args.into(),
            },
        ),
    };

    let response = client.call(request).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    match response {
        Response::Version { daemon, protocol } if command == "version" => {
            if !cli.json {
                println!("infrad {daemon} (protocol {protocol})");
            }
            Ok(())
        }
        Response::Health { status } if command == "health" => {
            if !cli.json {
                println!("{status}");
            }
            Ok(())
        }
        Response::Drivers { drivers } if command == "drivers" => {
            if !cli.json {
                for driver in drivers {
                    println!(
                        "{}\tconnected_at_ms={}\toutstanding={}",
                        driver.provider, driver.connected_at_ms, driver.outstanding
                    );
                }
            }
            Ok(())
        }
        Response::MachineCreated {
            provider_id,
            node_name,
            error,
        } if command == "create" => {
            if error != 0 {
                return Err(CliError::Driver { command, error });
            }
            if !cli.json {
                println!("{provider_id}\t{node_name}");
            }
            Ok(())
        }
        Response::MachineDeleted { error } if command == "delete" => {
            if error != 0 {
                return Err(CliError::Driver { command, error });
            }
            Ok(())
        }
        Response::Error {
            code,
            message,
            detail,
        } => Err(CliError::Daemon {
            code,
            message,
            detail: format_detail(detail),
        }),
        other => Err(CliError::Unexpected {
            command,
            response: Box::new(other),
        }),
    }
}

fn format_detail(detail: Option<String>) -> String {
    detail
        .map(|value| format!(" ({value})"))
        .unwrap_or_default()
}

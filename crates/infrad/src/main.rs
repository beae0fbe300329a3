mod classes;
mod dispatch;
mod driver;
mod handlers;
mod registry;

use std::{
    fs, io,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use classes::MachineClassCatalog;
use dispatch::DaemonDispatcher;
use infra_core::{PROTOCOL_VERSION, default_control_socket, default_driver_socket};
use infra_driver_proto::DRIVER_PROTOCOL_VERSION;
use infra_ipc::{DriverRegistrar, serve_drivers, serve_unix};
use registry::DriverRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "infrad", about = "Machine driver relay daemon")]
struct Args {
    /// Socket serving control requests.
    #[arg(long, env = "INFRA_CONTROL_SOCKET")]
    control_socket: Option<PathBuf>,
    /// Socket external drivers register on.
    #[arg(long, env = "INFRA_DRIVER_SOCKET")]
    driver_socket: Option<PathBuf>,
    /// JSON file mapping machine class names to their config.
    #[arg(long, env = "INFRA_MACHINE_CLASSES")]
    machine_classes: Option<PathBuf>,
    /// Per-operation response deadline in seconds; unbounded when unset.
    #[arg(long, env = "INFRA_CALL_TIMEOUT_SECS")]
    call_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("infrad error: {err}");
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
    let control_socket = args.control_socket.unwrap_or_else(default_control_socket);
    let driver_socket = args.driver_socket.unwrap_or_else(default_driver_socket);
    prepare_socket_path(&control_socket)?;
    prepare_socket_path(&driver_socket)?;

    let classes = match &args.machine_classes {
        Some(path) => MachineClassCatalog::load(path)?,
        None => MachineClassCatalog::default(),
    };
    let call_timeout = args.call_timeout_secs.map(Duration::from_secs);

    info!(
        control_socket = %control_socket.display(),
        driver_socket = %driver_socket.display(),
        machine_classes = classes.len(),
        call_timeout_secs = ?args.call_timeout_secs,
        daemon = env!("CARGO_PKG_VERSION"),
        protocol = PROTOCOL_VERSION,
        driver_protocol = DRIVER_PROTOCOL_VERSION,
        "starting infrad"
    );

    let registry = Arc::new(DriverRegistry::new(Arc::new(classes), call_timeout));
    let registrar: Arc<dyn DriverRegistrar> = registry.clone();
    let dispatcher = Arc::new(DaemonDispatcher::from(Arc::clone(&registry)));

    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        result = serve_unix(&control_socket, dispatcher) => result.map_err(Into::into),
        result = serve_drivers(&driver_socket, registrar) => result.map_err(Into::into),
        signal = tokio::signal::ctrl_c() => {
            info!("shutting down");
            signal.map_err(Into::into)
        }
    };

    registry.close_all();
    let _ = fs::remove_file(&control_socket);
    let _ = fs::remove_file(&driver_socket);
    result
}

/// Clears a stale socket and creates the parent directory.
fn prepare_socket_path(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_socket() {
                fs::remove_file(path)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a socket", path.display()),
                ))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

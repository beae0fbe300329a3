use std::{path::Path, sync::Arc, time::Duration};

use infra_driver_proto::{DRIVER_PROTOCOL_VERSION, DriverHello, RelayHello};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::UnixListener,
    time::timeout,
};
use tracing::{info, warn};

use crate::{
    IpcError, Session,
    codec::{read_message, write_message},
};

/// Maximum wait for a connecting driver to introduce itself.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Receives sessions for drivers that completed the hello handshake.
pub trait DriverRegistrar: Send + Sync + 'static {
    fn register(&self, session: Session);
}

/// Accepts driver connections on `path` until the listener fails.
pub async fn serve_drivers(
    path: &Path,
    registrar: Arc<dyn DriverRegistrar>,
) -> Result<(), IpcError> {
    let listener = UnixListener::bind(path)?;
    info!(socket = %path.display(), "accepting driver registrations");

    loop {
        let (stream, _) = listener.accept().await?;
        let registrar = Arc::clone(&registrar);

        tokio::spawn(async move {
            match accept_driver(stream).await {
                Ok(session) => registrar.register(session),
                Err(err) => warn!(error = %err, "driver registration failed"),
            }
        });
    }
}

/// Runs the relay side of the hello handshake and wraps the stream in a
/// [`Session`] on success.
pub async fn accept_driver<S>(mut stream: S) -> Result<Session, IpcError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let hello: DriverHello = timeout(HANDSHAKE_TIMEOUT, read_message(&mut stream))
        .await
        .map_err(|_| IpcError::Timeout)??;

    if hello.protocol != DRIVER_PROTOCOL_VERSION {
        let reason = format!(
            "unsupported driver protocol: expected={DRIVER_PROTOCOL_VERSION} got={}",
            hello.protocol
        );
        let _ = write_message(&mut stream, &RelayHello::HelloReject { reason }).await;
        return Err(IpcError::ProtocolMismatch {
            expected: DRIVER_PROTOCOL_VERSION,
            actual: hello.protocol,
        });
    }

    let provider = hello.provider.trim().to_string();
    if provider.is_empty() {
        let reason = "provider name cannot be empty".to_string();
        let _ = write_message(
            &mut stream,
            &RelayHello::HelloReject {
                reason: reason.clone(),
            },
        )
        .await;
        return Err(IpcError::Handshake(reason));
    }

    write_message(
        &mut stream,
        &RelayHello::HelloAck {
            protocol: DRIVER_PROTOCOL_VERSION,
        },
    )
    .await?;

    info!(provider = %provider, "driver registered");
    Ok(Session::new(provider, stream))
}

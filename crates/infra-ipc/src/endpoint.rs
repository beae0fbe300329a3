use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use infra_driver_proto::{
    DRIVER_PROTOCOL_VERSION, DriverHello, OperationParams, OperationRequest, OperationResponse,
    OperationResult, OperationType, RelayHello,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::UnixStream,
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    IpcError,
    codec::{read_message, write_message},
    registration::HANDSHAKE_TIMEOUT,
};

/// Responses queued for the writer task before handlers start waiting.
const RESPONSE_QUEUE: usize = 64;

/// Provider logic behind a driver process.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    /// Answers one operation. `None` sends a response without a body.
    async fn handle(
        &self,
        operation_type: &OperationType,
        params: OperationParams,
    ) -> Option<OperationResult>;
}

/// Driver side of a registered relay connection.
pub struct DriverEndpoint {
    provider: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl DriverEndpoint {
    /// Connects to the relay driver socket and registers as `provider`.
    pub async fn connect(path: impl AsRef<Path>, provider: &str) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path).await?;
        Self::register(stream, provider).await
    }

    /// Runs the driver side of the hello handshake on an open stream.
    pub async fn register<S>(mut stream: S, provider: &str) -> Result<Self, IpcError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let hello = DriverHello {
            protocol: DRIVER_PROTOCOL_VERSION,
            provider: provider.to_string(),
        };
        write_message(&mut stream, &hello).await?;

        let answer: RelayHello = timeout(HANDSHAKE_TIMEOUT, read_message(&mut stream))
            .await
            .map_err(|_| IpcError::Timeout)??;
        match answer {
            RelayHello::HelloAck { protocol } if protocol == DRIVER_PROTOCOL_VERSION => {}
            RelayHello::HelloAck { protocol } => {
                return Err(IpcError::ProtocolMismatch {
                    expected: DRIVER_PROTOCOL_VERSION,
                    actual: protocol,
                });
            }
            RelayHello::HelloReject { reason } => return Err(IpcError::Handshake(reason)),
        }

        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            provider: provider.to_string(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Serves operation requests until the relay closes the stream.
    ///
    /// Each request runs on its own task, so answers go back in completion
    /// order rather than request order.
    pub async fn serve(self, handler: Arc<dyn OperationHandler>) -> Result<(), IpcError> {
        let DriverEndpoint {
            provider,
            mut reader,
            mut writer,
        } = self;
        let (tx, mut rx) = mpsc::channel::<OperationResponse>(RESPONSE_QUEUE);

        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                write_message(&mut writer, &response).await?;
            }
            writer.shutdown().await?;
            Ok::<(), IpcError>(())
        });

        let read_result = loop {
            let request: OperationRequest = match read_message(&mut reader).await {
                Ok(request) => request,
                Err(IpcError::Closed) => break Ok(()),
                Err(err) => break Err(err),
            };

            debug!(
                provider = %provider,
                operation_id = %request.operation_id,
                operation_type = %request.operation_type,
                "received operation request"
            );

            let handler = Arc::clone(&handler);
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = handler
                    .handle(&request.operation_type, request.operation_params)
                    .await;
                let response = OperationResponse {
                    operation_id: request.operation_id,
                    result,
                };
                if tx.send(response).await.is_err() {
                    warn!(operation_id = %request.operation_id, "relay writer gone, dropping response");
                }
            });
        };

        drop(tx);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_transport() => {}
            Ok(Err(err)) => warn!(error = %err, "failed to flush driver responses"),
            Err(err) => warn!(error = %err, "driver writer task failed"),
        }
        read_result
    }
}

use std::{io::ErrorKind, path::Path, sync::Arc};

use async_trait::async_trait;
use infra_core::{ErrorCode, ReqId, Request, RequestEnvelope, Response, ResponseEnvelope};
use serde::Deserialize;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::{
    IpcError,
    codec::{decode, write_message},
    framing::read_frame,
};

/// Answers control-plane requests.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, req: Request) -> Response;
}

/// Serves control requests on `path`, one task per client connection.
pub async fn serve_unix(path: &Path, handler: Arc<dyn RequestHandler>) -> Result<(), IpcError> {
    let listener = UnixListener::bind(path)?;
    info!(socket = %path.display(), "serving control requests");

    loop {
        let (stream, _) = listener.accept().await?;
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, handler).await {
                debug!(error = %err, "control connection exited with error");
            }
        });
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    handler: Arc<dyn RequestHandler>,
) -> Result<(), IpcError> {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(IpcError::Closed) => return Ok(()),
            Err(IpcError::Io(err))
                if matches!(
                    err.kind(),
                    ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
                ) =>
            {
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        match decode::<RequestEnvelope<Request>>(&frame) {
            Ok(req) => {
                let envelope = ResponseEnvelope {
                    req_id: req.req_id,
                    body: handler.handle(req.body).await,
                };
                write_message(&mut stream, &envelope).await?;
            }
            Err(err) => {
                // Answer with a structured error when the id is recoverable,
                // then drop the connection.
                if let Some(req_id) = extract_req_id(&frame) {
                    let envelope = ResponseEnvelope {
                        req_id,
                        body: Response::Error {
                            code: ErrorCode::InvalidRequest,
                            message: "failed to decode request envelope".to_string(),
                            detail: Some(err.to_string()),
                        },
                    };
                    let _ = write_message(&mut stream, &envelope).await;
                }
                return Ok(());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReqIdOnly {
    req_id: ReqId,
}

fn extract_req_id(frame: &[u8]) -> Option<ReqId> {
    decode::<ReqIdOnly>(frame).ok().map(|decoded| decoded.req_id)
}

use std::{path::Path, time::Duration};

use infra_core::{ReqId, Request, RequestEnvelope, Response, ResponseEnvelope};
use tokio::{net::UnixStream, time::timeout};

use crate::{
    IpcError,
    codec::{read_message, write_message},
};

/// Driver operations can take minutes on slow providers.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Request/response client for the relay daemon control socket.
pub struct ControlClient {
    /// Connected socket stream.
    stream: UnixStream,
    /// Next request id to assign.
    next_req_id: u64,
    /// Per-call timeout.
    timeout: Duration,
}

impl ControlClient {
    /// Connects a client to the daemon control socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream,
            next_req_id: 1,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Overrides the default call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends one request and waits for the matching response.
    pub async fn call(&mut self, req: Request) -> Result<Response, IpcError> {
        let req_id = ReqId(self.next_req_id);
        self.next_req_id = self.next_req_id.saturating_add(1);

        let envelope = RequestEnvelope { req_id, body: req };
        let response: ResponseEnvelope<Response> = timeout(self.timeout, async {
            write_message(&mut self.stream, &envelope).await?;
            read_message(&mut self.stream).await
        })
        .await
        .map_err(|_| IpcError::Timeout)??;

        if response.req_id != req_id {
            return Err(IpcError::RequestIdMismatch {
                expected: req_id.0,
                actual: response.req_id.0,
            });
        }

        Ok(response.body)
    }
}

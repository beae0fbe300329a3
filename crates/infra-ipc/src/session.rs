use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
    time::Duration,
};

use infra_core::OperationId;
use infra_driver_proto::{
    OperationParams, OperationRequest, OperationResponse, OperationResult, OperationType,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{Mutex as AsyncMutex, watch},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    IpcError,
    codec::{read_message, write_message},
    correlation::{CorrelationTable, Delivery},
};

/// Upper bound on flushing the write half once the dispatch loop ends.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One registered driver connection.
///
/// Many callers share the stream: each [`Session::send_and_wait`] gets its own
/// operation id, and a single dispatch loop reads every inbound frame and
/// routes it back through the correlation table. Writes are serialized by the
/// writer lock. The session closes on the first transport error or on
/// [`Session::close`]; closing wakes every outstanding caller.
pub struct Session {
    provider: String,
    reader: AsyncMutex<BoxedReader>,
    writer: AsyncMutex<BoxedWriter>,
    next_operation_id: AtomicI32,
    pending: CorrelationTable,
    closed: AtomicBool,
    done: watch::Sender<bool>,
    call_timeout: Option<Duration>,
}

impl Session {
    /// Wraps an already-registered driver stream.
    pub fn new<S>(provider: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        Self::from_parts(provider, Box::new(reader), Box::new(writer))
    }

    /// Builds a session from separate read and write halves.
    pub fn from_parts(
        provider: impl Into<String>,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            provider: provider.into(),
            reader: AsyncMutex::new(reader),
            writer: AsyncMutex::new(writer),
            next_operation_id: AtomicI32::new(0),
            pending: CorrelationTable::new(),
            closed: AtomicBool::new(false),
            done,
            call_timeout: None,
        }
    }

    /// Bounds how long a single call may take, send included.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    /// Moves the session behind an `Arc` and starts its dispatch loop.
    pub fn spawn(self) -> Arc<Self> {
        let session = Arc::new(self);
        let runner = Arc::clone(&session);
        tokio::spawn(async move {
            let err = runner.dispatch().await;
            debug!(provider = %runner.provider, error = %err, "dispatch loop exited");
            // Senders abandon the writer once the session is closed, but a
            // stuck transport must not hold this task forever.
            match timeout(WRITER_SHUTDOWN_GRACE, runner.writer.lock()).await {
                Ok(mut writer) => {
                    let _ = timeout(WRITER_SHUTDOWN_GRACE, writer.shutdown()).await;
                }
                Err(_) => {
                    warn!(provider = %runner.provider, "writer still busy, skipping shutdown");
                }
            }
        });
        session
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of calls waiting for a driver response.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Transmits one request. A transport failure closes the session.
    pub async fn send(&self, request: &OperationRequest) -> Result<(), IpcError> {
        if self.is_closed() {
            return Err(IpcError::SessionClosed);
        }

        // A peer that stops reading can block the write indefinitely; closing
        // the session abandons it, possibly mid-frame.
        let write = async {
            let mut writer = self.writer.lock().await;
            write_message(&mut *writer, request).await
        };
        let result = tokio::select! {
            result = write => result,
            _ = self.wait() => Err(IpcError::SessionClosed),
        };

        if let Err(err) = &result
            && !matches!(err, IpcError::SessionClosed)
        {
            warn!(
                provider = %self.provider,
                operation_id = %request.operation_id,
                error = %err,
                "failed to send operation request"
            );
            if err.is_transport() {
                self.close();
            }
        }
        result
    }

    /// Waits for the next inbound response. Any error closes the session.
    ///
    /// Only the dispatch loop should call this; the reader lock keeps a second
    /// caller from interleaving reads.
    pub async fn receive(&self) -> Result<OperationResponse, IpcError> {
        let mut done = self.done.subscribe();
        let mut reader = self.reader.lock().await;

        let result = tokio::select! {
            result = read_message::<_, OperationResponse>(&mut *reader) => result,
            _ = done.wait_for(|closed| *closed) => Err(IpcError::SessionClosed),
        };

        if let Err(err) = &result {
            if !matches!(err, IpcError::SessionClosed) {
                warn!(provider = %self.provider, error = %err, "failed to receive from driver");
            }
            self.close();
        }
        result
    }

    /// Marks the session terminated and wakes every waiter. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.done.send_replace(true);
        info!(
            provider = %self.provider,
            outstanding = self.pending.len(),
            "driver session closed"
        );
    }

    /// Resolves once the session has terminated.
    pub async fn wait(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|closed| *closed).await;
    }

    /// Reads inbound frames until the stream fails, routing each response to
    /// its waiting caller. Returns the error that ended the loop.
    pub async fn dispatch(&self) -> IpcError {
        loop {
            let response = match self.receive().await {
                Ok(response) => response,
                Err(err) => return err,
            };

            let operation_id = response.operation_id;
            match self.pending.deliver(response) {
                Ok(Delivery::Delivered) => {
                    debug!(provider = %self.provider, %operation_id, "routed driver response");
                }
                Ok(Delivery::Unmatched) => {
                    warn!(
                        provider = %self.provider,
                        %operation_id,
                        "operation id missing in pending requests, dropping response"
                    );
                }
                Ok(Delivery::Duplicate) => {
                    warn!(
                        provider = %self.provider,
                        %operation_id,
                        "duplicate response for pending operation, dropping"
                    );
                }
                Err(err) => {
                    warn!(provider = %self.provider, %operation_id, error = %err, "failed to route response");
                }
            }
        }
    }

    /// Sends one operation and waits for the driver's answer.
    ///
    /// Returns the response body, which a driver may leave empty. Fails with
    /// [`IpcError::SessionClosed`] if the session terminates first and with
    /// [`IpcError::Timeout`] if a call timeout is configured and elapses. The
    /// timeout covers sending as well as waiting; one that fires mid-send
    /// closes the session.
    pub async fn send_and_wait(
        &self,
        operation_type: OperationType,
        operation_params: OperationParams,
    ) -> Result<Option<OperationResult>, IpcError> {
        if self.is_closed() {
            return Err(IpcError::SessionClosed);
        }

        let operation_id = self.next_operation_id()?;
        let mut slot = self.pending.register(operation_id)?;

        let request = OperationRequest {
            operation_id,
            operation_type,
            operation_params,
        };
        let mut sent = false;
        let call = async {
            self.send(&request).await?;
            sent = true;
            tokio::select! {
                biased;
                Some(response) = slot.response() => Ok(response),
                _ = self.wait() => Err(IpcError::SessionClosed),
            }
        };

        let outcome = match self.call_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .unwrap_or(Err(IpcError::Timeout)),
            None => call.await,
        };

        if matches!(outcome, Err(IpcError::Timeout)) && !sent {
            // The frame may be half written; the stream cannot be trusted.
            warn!(
                provider = %self.provider,
                %operation_id,
                "call timed out while sending, closing session"
            );
            self.close();
        }
        Ok(outcome?.result)
    }

    /// Allocates the next operation id; ids start at 1 and never wrap.
    fn next_operation_id(&self) -> Result<OperationId, IpcError> {
        self.next_operation_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(1)
            })
            .map(|previous| OperationId(previous + 1))
            .map_err(|_| IpcError::OperationIdsExhausted)
    }

    #[cfg(test)]
    fn set_last_operation_id(&self, id: i32) {
        self.next_operation_id.store(id, Ordering::Release);
    }
}

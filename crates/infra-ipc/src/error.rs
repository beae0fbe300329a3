use thiserror::Error;

/// Transport, serialization and session failures for relay IPC.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Underlying socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Peer closed the stream on a frame boundary.
    #[error("peer closed the stream")]
    Closed,
    /// Request/response encoding failed.
    #[error("failed to encode cbor payload: {0}")]
    Encode(String),
    /// Request/response decoding failed.
    #[error("failed to decode cbor payload: {0}")]
    Decode(String),
    /// Operation exceeded configured timeout.
    #[error("request timed out")]
    Timeout,
    /// Frame size exceeded maximum allowed payload.
    #[error("frame too large: {size} > {max}")]
    FrameTooLarge { size: u32, max: u32 },
    /// Response did not match request identifier.
    #[error("request id mismatch: expected {expected}, got {actual}")]
    RequestIdMismatch { expected: u64, actual: u64 },
    /// Peer protocol version did not match local expectation.
    #[error("protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: u32, actual: u32 },
    /// Registration handshake was refused or malformed.
    #[error("driver handshake failed: {0}")]
    Handshake(String),
    /// The driver session terminated before the call resolved.
    #[error("driver session closed")]
    SessionClosed,
    /// The session ran out of operation identifiers.
    #[error("operation ids exhausted for this session")]
    OperationIdsExhausted,
    /// An operation id is already awaiting a response.
    #[error("operation {0} is already pending")]
    DuplicateOperation(i32),
    /// Shared state was poisoned by a panicking holder.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IpcError {
    /// True when the error means the underlying stream is no longer usable.
    pub fn is_transport(&self) -> bool {
        matches!(self, IpcError::Io(_) | IpcError::Closed)
    }
}

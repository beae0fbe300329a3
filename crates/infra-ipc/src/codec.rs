use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    IpcError,
    framing::{read_frame, write_frame},
};

/// Serializes a value to CBOR bytes for wire transmission.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, IpcError> {
    serde_cbor::to_vec(value).map_err(|err| IpcError::Encode(err.to_string()))
}

/// Deserializes a CBOR frame payload into a typed value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IpcError> {
    serde_cbor::from_slice(bytes).map_err(|err| IpcError::Decode(err.to_string()))
}

/// Encodes `value` and writes it as one frame.
pub async fn write_message<W, T>(writer: &mut W, value: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = encode(value)?;
    write_frame(writer, &payload).await
}

/// Reads one frame and decodes it as `T`.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let frame = read_frame(reader).await?;
    decode(&frame)
}

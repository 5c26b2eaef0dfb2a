//! Wire framing for bus messages
//!
//! ```text
//! [event type: 1 byte][request id: 16 bytes][correlation id: 16 bytes]
//! [payload length: 4 bytes LE][payload]
//! ```
//!
//! A nil correlation UUID on the wire means "none". `source` is not
//! framed; the hub stamps it on arrival.

use super::{BusMessage, EventType};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Upper bound on a single frame's payload (a full order list is a few
/// hundred KiB at the extreme; anything past this is a corrupt stream)
const MAX_PAYLOAD_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("invalid event type byte: {0}")]
    InvalidEventType(u8),

    #[error("frame payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one framed message from an async stream
pub async fn read_message<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<BusMessage, CodecError> {
    let mut type_buf = [0u8; 1];
    match reader.read_exact(&mut type_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::Disconnected);
        }
        Err(e) => return Err(CodecError::Io(e)),
    }

    let event_type =
        EventType::try_from(type_buf[0]).map_err(|_| CodecError::InvalidEventType(type_buf[0]))?;

    let mut uuid_buf = [0u8; 16];
    reader.read_exact(&mut uuid_buf).await?;
    let request_id = Uuid::from_bytes(uuid_buf);

    let mut correlation_buf = [0u8; 16];
    reader.read_exact(&mut correlation_buf).await?;
    let correlation_raw = Uuid::from_bytes(correlation_buf);
    let correlation_id = if correlation_raw.is_nil() {
        None
    } else {
        Some(correlation_raw)
    };

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(BusMessage {
        request_id,
        event_type,
        source: None,
        correlation_id,
        payload,
    })
}

/// Write one framed message to an async stream
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &BusMessage,
) -> Result<(), CodecError> {
    let mut data = Vec::with_capacity(37 + msg.payload.len());
    data.push(msg.event_type as u8);
    data.extend_from_slice(msg.request_id.as_bytes());
    let correlation_bytes = msg.correlation_id.unwrap_or(Uuid::nil()).into_bytes();
    data.extend_from_slice(&correlation_bytes);
    data.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&msg.payload);

    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

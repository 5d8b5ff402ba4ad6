//! Framing for election messages.
//!
//! Every frame is a 4-byte big-endian length followed by a JSON envelope
//! carrying the protocol version. UDP datagrams hold exactly one frame; TCP
//! hand-off streams hold one frame per message.

use crate::protocol::{ElectionMessage, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum message size (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    message: ElectionMessage,
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn encode_body(message: &ElectionMessage) -> io::Result<Vec<u8>> {
    let envelope = Envelope {
        version: PROTOCOL_VERSION,
        message: message.clone(),
    };
    let data = serde_json::to_vec(&envelope).map_err(|e| invalid(format!("JSON encode error: {e}")))?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(invalid(format!("message too large: {} bytes", data.len())));
    }
    Ok(data)
}

fn decode_body(data: &[u8]) -> io::Result<ElectionMessage> {
    let envelope: Envelope =
        serde_json::from_slice(data).map_err(|e| invalid(format!("JSON decode error: {e}")))?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(invalid(format!(
            "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
            envelope.version
        )));
    }
    Ok(envelope.message)
}

/// Encodes one message into a length-prefixed frame.
pub fn encode_frame(message: &ElectionMessage) -> io::Result<Vec<u8>> {
    let data = encode_body(message)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + data.len());
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&data);
    Ok(frame)
}

/// Decodes a frame produced by [`encode_frame`].
///
/// The buffer must contain exactly one frame.
pub fn decode_frame(frame: &[u8]) -> io::Result<ElectionMessage> {
    if frame.len() < LENGTH_PREFIX {
        return Err(invalid(format!("truncated frame: {} bytes", frame.len())));
    }
    let (len_bytes, body) = frame.split_at(LENGTH_PREFIX);
    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(len_bytes);
    let len = u32::from_be_bytes(prefix) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(invalid(format!("message too large: {len} bytes")));
    }
    if body.len() != len {
        return Err(invalid(format!(
            "frame length mismatch: header says {len}, got {}",
            body.len()
        )));
    }
    decode_body(body)
}

/// Reads a length-prefixed message from a stream.
pub async fn read_message<T: AsyncRead + Unpin>(io: &mut T) -> io::Result<ElectionMessage> {
    let mut len_bytes = [0u8; LENGTH_PREFIX];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(invalid(format!("message too large: {len} bytes")));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    decode_body(&buf)
}

/// Writes a length-prefixed message to a stream.
pub async fn write_message<T: AsyncWrite + Unpin>(
    io: &mut T,
    message: &ElectionMessage,
) -> io::Result<()> {
    let data = encode_body(message)?;
    io.write_all(&(data.len() as u32).to_be_bytes()).await?;
    io.write_all(&data).await?;
    io.flush().await?;
    Ok(())
}

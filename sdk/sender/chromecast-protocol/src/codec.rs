//! Length prefixed framing of [`CastMessage`]s.
//!
//! A frame is a 4 byte big-endian length `N` followed by `N` bytes of the
//! protobuf encoded envelope.

use log::debug;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protos::CastMessage;

pub const LENGTH_PREFIX_SIZE: usize = 4;
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("frame length {0} exceeds the maximum of {MAX_FRAME_LENGTH} bytes")]
    TooLarge(usize),
    #[error("malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Serializes `message` into a complete frame, length prefix included.
pub fn encode_frame(message: &CastMessage) -> Result<Vec<u8>, FrameError> {
    let encoded_len = message.encoded_len();
    if encoded_len > MAX_FRAME_LENGTH {
        return Err(FrameError::TooLarge(encoded_len));
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + encoded_len);
    frame.extend_from_slice(&(encoded_len as u32).to_be_bytes());
    message.encode(&mut frame)?;

    Ok(frame)
}

/// Decodes one complete frame held in `frame`.
pub fn decode_frame(frame: &[u8]) -> Result<CastMessage, FrameError> {
    if frame.len() < LENGTH_PREFIX_SIZE {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    let (prefix, body) = frame.split_at(LENGTH_PREFIX_SIZE);
    let size = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if size > MAX_FRAME_LENGTH {
        return Err(FrameError::TooLarge(size));
    }
    if body.len() < size {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    Ok(CastMessage::decode(&body[..size])?)
}

/// Reads exactly one frame from `reader`.
///
/// `body_buf` is scratch space and must be at least [`MAX_FRAME_LENGTH`] long.
/// Short reads are retried until the frame is complete; end of stream
/// (a read returning zero bytes) is reported as an `UnexpectedEof` I/O error.
pub async fn read_frame<R>(reader: &mut R, body_buf: &mut [u8]) -> Result<CastMessage, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut size_buf = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut size_buf).await?;
    let size = u32::from_be_bytes(size_buf) as usize;

    if size > MAX_FRAME_LENGTH || size > body_buf.len() {
        return Err(FrameError::TooLarge(size));
    }

    reader.read_exact(&mut body_buf[..size]).await?;

    debug!("Received {size} bytes");

    Ok(CastMessage::decode(&body_buf[..size])?)
}

/// Writes `message` as a single frame and flushes `writer`.
pub async fn write_frame<W>(writer: &mut W, message: &CastMessage) -> Result<usize, FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(frame.len())
}

//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ```text
//! ┌─────────────────────────────────────────┬──────┐
//! │ JSON object (request or response)       │ '\n' │
//! └─────────────────────────────────────────┴──────┘
//! ```
//!
//! Blank lines between frames are ignored. A frame longer than
//! `MAX_FRAME_SIZE` is a protocol error and the connection cannot resync.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, StoreError};
use super::{Request, Response};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const DELIMITER: u8 = b'\n';

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request as one newline-terminated JSON line
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    encode_frame(request)
}

/// Decode a request from one frame (with or without the trailing newline)
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    Ok(serde_json::from_slice(trim_frame(bytes))?)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response as one newline-terminated JSON line
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    encode_frame(response)
}

/// Decode a response from one frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    Ok(serde_json::from_slice(trim_frame(bytes))?)
}

// =============================================================================
// Stream Helpers
// =============================================================================

/// Read the next request
///
/// Returns `Ok(None)` on a clean end of stream.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    match read_frame(reader).await? {
        Some(frame) => decode_request(&frame).map(Some),
        None => Ok(None),
    }
}

/// Write a request and flush
pub async fn write_request<W>(writer: &mut W, request: &Request) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_request(request)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next response
///
/// Returns `Ok(None)` on a clean end of stream.
pub async fn read_response<R>(reader: &mut R) -> Result<Option<Response>>
where
    R: AsyncBufRead + Unpin,
{
    match read_frame(reader).await? {
        Some(frame) => decode_response(&frame).map(Some),
        None => Ok(None),
    }
}

/// Write a response and flush
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_response(response)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

fn encode_frame<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(DELIMITER);
    Ok(bytes)
}

fn trim_frame(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Read one non-blank line, enforcing the size limit
async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut frame = Vec::new();
        let read = (&mut *reader)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_until(DELIMITER, &mut frame)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if frame.last() != Some(&DELIMITER) {
            if frame.len() > MAX_FRAME_SIZE {
                return Err(StoreError::Protocol(format!(
                    "Frame too large: more than {} bytes",
                    MAX_FRAME_SIZE
                )));
            }
            return Err(StoreError::Protocol(format!(
                "Incomplete frame: stream ended after {} bytes",
                frame.len()
            )));
        }

        if trim_frame(&frame).is_empty() {
            continue;
        }

        return Ok(Some(frame));
    }
}

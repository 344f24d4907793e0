//! Length-prefixed JSON frames.
//!
//! ```text
//! frame := length (u32, little-endian) || payload (length bytes of UTF-8 JSON)
//! ```
//!
//! The prefix is pinned to little-endian rather than host byte order so that a
//! frame means the same thing on every architecture the host is built for.

use std::io;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted from the extension.
pub const MAX_INBOUND_FRAME: u32 = 64 * 1024 * 1024;

/// Largest frame the browser accepts from a native host.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame length {len} exceeds limit {limit}")]
    Oversized { len: u64, limit: u64 },

    #[error("stream closed after {read} of {expected} bytes")]
    Truncated { read: usize, expected: usize },

    #[error("frame payload is not valid JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Reads one frame. `Ok(None)` means the peer closed the stream cleanly
/// before a new frame started.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let read = fill(reader, &mut prefix).await?;
    if read == 0 {
        return Ok(None);
    }
    if read < PREFIX_LEN {
        return Err(FramingError::Truncated {
            read,
            expected: PREFIX_LEN,
        });
    }

    let len = u32::from_le_bytes(prefix);
    if len > MAX_INBOUND_FRAME {
        return Err(FramingError::Oversized {
            len: u64::from(len),
            limit: u64::from(MAX_INBOUND_FRAME),
        });
    }

    let expected = len as usize;
    let mut payload = vec![0u8; expected];
    let read = fill(reader, &mut payload).await?;
    if read < expected {
        return Err(FramingError::Truncated { read, expected });
    }

    // serde_json validates UTF-8 on the way in.
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(FramingError::InvalidPayload)
}

/// Writes one frame and flushes it.
pub async fn write_message<W, T>(writer: &mut W, value: &T) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value).map_err(FramingError::Encode)?;
    if payload.len() > MAX_OUTBOUND_FRAME {
        return Err(FramingError::Oversized {
            len: payload.len() as u64,
            limit: MAX_OUTBOUND_FRAME as u64,
        });
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Like `read_exact`, but reports how far it got when the stream ends early.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn round_trips_nested_and_empty_payloads() {
        let messages = vec![
            json!({"command": "save_browser_data", "data": []}),
            json!({"status": "success", "top_sites": [{"url": "https://a.com", "nested": {"a": [1, [2, [3, {"b": null}]]]}}]}),
            json!({"command": "get_stats"}),
        ];

        let mut buf = Vec::new();
        for message in &messages {
            write_message(&mut buf, message).await.unwrap();
        }

        let mut reader = buf.as_slice();
        for expected in &messages {
            let decoded = read_message(&mut reader).await.unwrap();
            assert_eq!(decoded.as_ref(), Some(expected));
        }
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_message(&mut buf, &json!({"a": 1})).await.unwrap();
        let body = br#"{"a":1}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_le_bytes());
        assert_eq!(&buf[4..], body);
    }

    #[tokio::test]
    async fn empty_stream_is_end_of_stream() {
        let mut reader: &[u8] = &[];
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_prefix_is_truncated() {
        let mut reader: &[u8] = &[5, 0];
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::Truncated { read: 2, expected: 4 }));
    }

    #[tokio::test]
    async fn short_body_is_truncated() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        let mut reader = bytes.as_slice();
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::Truncated { read: 2, expected: 10 }));
    }

    #[tokio::test]
    async fn oversized_prefix_rejected_before_allocation() {
        let bytes = u32::MAX.to_le_bytes();
        let mut reader: &[u8] = &bytes;
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::Oversized { .. }));
    }

    #[tokio::test]
    async fn invalid_json_is_invalid_payload() {
        let bytes = frame(b"{not json");
        let mut reader = bytes.as_slice();

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let bytes = frame(&[0x22, 0xff, 0xfe, 0x22]);
        let mut reader = bytes.as_slice();
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn oversized_response_is_not_written() {
        let big = "x".repeat(MAX_OUTBOUND_FRAME + 1);
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &json!({ "blob": big })).await.unwrap_err();
        assert!(matches!(err, FramingError::Oversized { .. }));
        assert!(buf.is_empty());
    }
}

//! Frame Protocol
//!
//! Length-prefixed JSON with a CRC32 of the payload.
//!
//! ```text
//! +----------------+----------------+--------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (Length bytes)    |
//! | big-endian u32 | big-endian u32 | SurfaceFrame / CoordinatorFrame|
//! +----------------+----------------+--------------------------------+
//! ```
//!
//! The length is checked against [`MAX_FRAME_SIZE`] before any payload buffer
//! is allocated.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Largest accepted payload (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length + checksum
const HEADER_SIZE: usize = 8;

/// Encode `msg` into a complete frame
///
/// # Errors
///
/// Returns an error if serialization fails or the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(msg).map_err(|e| TransportError::Serialization(e.to_string()))?;
    let len = checked_len(json.len())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&crc32fast::hash(&json).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

fn checked_len(size: usize) -> Result<u32, TransportError> {
    if size > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    u32::try_from(size).map_err(|_| TransportError::FrameTooLarge {
        size,
        max: MAX_FRAME_SIZE,
    })
}

/// Write one frame and flush
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
///
/// Returns `Ok(None)` on a clean end of stream between frames. Not
/// cancel-safe: a partially read frame is lost if the future is dropped.
///
/// # Errors
///
/// Returns an error on I/O failure, an oversized length, a checksum mismatch,
/// or a payload that does not deserialize as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let [l0, l1, l2, l3, c0, c1, c2, c3] = header;
    let len = u32::from_be_bytes([l0, l1, l2, l3]) as usize;
    let expected = u32::from_be_bytes([c0, c1, c2, c3]);

    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let actual = crc32fast::hash(&payload);
    if actual != expected {
        return Err(TransportError::ChecksumMismatch { expected, actual });
    }

    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| TransportError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SurfaceFrame;
    use crate::surface::SurfaceKind;

    #[tokio::test]
    async fn test_frames_cross_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            write_frame(
                &mut client,
                &SurfaceFrame::Attach {
                    surface: SurfaceKind::Primary,
                },
            )
            .await
            .unwrap();
            write_frame(&mut client, &SurfaceFrame::Pointer { x: 1.5, y: -2.0 })
                .await
                .unwrap();
        });

        let first: Option<SurfaceFrame> = read_frame(&mut server).await.unwrap();
        let second: Option<SurfaceFrame> = read_frame(&mut server).await.unwrap();
        writer.await.unwrap();
        let end: Option<SurfaceFrame> = read_frame(&mut server).await.unwrap();

        assert_eq!(
            first,
            Some(SurfaceFrame::Attach {
                surface: SurfaceKind::Primary
            })
        );
        assert_eq!(second, Some(SurfaceFrame::Pointer { x: 1.5, y: -2.0 }));
        assert_eq!(end, None);
    }

    #[test]
    fn test_header_layout() {
        let frame = encode(&SurfaceFrame::Detach).unwrap();
        let json = br#"{"type":"detach"}"#;

        assert_eq!(&frame[..4], &(json.len() as u32).to_be_bytes());
        assert_eq!(&frame[4..8], &crc32fast::hash(json).to_be_bytes());
        assert_eq!(&frame[8..], json);
    }

    #[tokio::test]
    async fn test_corrupted_payload_rejected() {
        let mut frame = encode(&SurfaceFrame::Detach).unwrap();
        let last = frame.len() - 2;
        frame[last] ^= 0x20;

        let result: Result<Option<SurfaceFrame>, _> = read_frame(&mut frame.as_slice()).await;

        assert!(matches!(
            result,
            Err(TransportError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected_before_read() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&u32::MAX.to_be_bytes());
        frame.extend_from_slice(&0u32.to_be_bytes());

        let result: Result<Option<SurfaceFrame>, _> = read_frame(&mut frame.as_slice()).await;

        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_io_error() {
        let frame = encode(&SurfaceFrame::Detach).unwrap();
        let truncated = &frame[..frame.len() - 3];

        let result: Result<Option<SurfaceFrame>, _> = read_frame(&mut &truncated[..]).await;

        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            encode(&big),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}

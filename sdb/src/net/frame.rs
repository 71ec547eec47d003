//! Length-prefixed message framing, shared by the SDBP client protocol
//! and the cluster protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::Error;

/// Frames larger than this are almost certainly a protocol
/// desynchronization rather than a legitimate message; refuse them
/// instead of allocating unbounded memory.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// A single length-prefixed frame: `<u32 len><payload>`.
#[derive(Debug, Clone, Default)]
pub struct Frame;

impl Frame {
    /// Read one frame from the stream.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes, Error> {
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge(len));
        }

        let mut buf = BytesMut::zeroed(len);
        reader.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// Write one frame to the stream.
    pub async fn write<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge(payload.len()));
        }

        let mut header = BytesMut::with_capacity(4 + payload.len());
        header.put_u32(payload.len() as u32);
        header.put_slice(payload);
        writer.write_all(&header).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Read a `<len><bytes>` prefixed binary blob out of a field buffer,
/// the length given as ASCII digits.
pub fn read_blob(buf: &mut Bytes) -> Result<Bytes, Error> {
    let mut digits = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(Error::MalformedField(0));
        }
        let b = buf[0];
        if b == b':' {
            buf.advance(1);
            break;
        }
        digits.push(b);
        buf.advance(1);
    }
    let len: usize = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::MalformedField(0))?;

    if buf.remaining() < len {
        return Err(Error::MalformedField(0));
    }
    Ok(buf.split_to(len))
}

/// Write a `<len>:<bytes>` prefixed binary blob into a field buffer.
pub fn write_blob(out: &mut BytesMut, blob: &[u8]) {
    out.put_slice(blob.len().to_string().as_bytes());
    out.put_u8(b':');
    out.put_slice(blob);
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut a, mut b) = duplex(4096);

        Frame::write(&mut a, b"hello world").await.unwrap();
        let got = Frame::read(&mut b).await.unwrap();

        assert_eq!(&got[..], b"hello world");
    }

    #[tokio::test]
    async fn test_frame_too_large_rejected_on_write() {
        let (mut a, _b) = duplex(4096);
        let huge = vec![0u8; MAX_FRAME_LEN + 1];
        let err = Frame::write(&mut a, &huge).await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }

    #[test]
    fn test_blob_roundtrip() {
        let mut out = BytesMut::new();
        write_blob(&mut out, b"abc");
        write_blob(&mut out, b"");

        let mut bytes = out.freeze();
        assert_eq!(&read_blob(&mut bytes).unwrap()[..], b"abc");
        assert_eq!(&read_blob(&mut bytes).unwrap()[..], b"");
    }

    #[test]
    fn test_blob_malformed_length_errors() {
        let mut bytes = Bytes::from_static(b"xx:abc");
        assert!(read_blob(&mut bytes).is_err());
    }
}

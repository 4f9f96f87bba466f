//! Length prefixed frames: a little-endian `u32` length, then the bytes.
use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::error::Result;

/// Upper bound of a frame body.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub async fn write_frame<W>(w: &mut W, body: &[u8]) -> Result<()>
where W: AsyncWrite + Unpin {
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(body.len()));
    }
    w.write_all(&(body.len() as u32).to_le_bytes()).await?;
    w.write_all(body).await?;
    w.flush().await?;
    Ok(())
}

/// Read one frame, `None` on a clean end of stream.
pub async fn read_frame<R>(r: &mut R) -> Result<Option<Bytes>>
where R: AsyncRead + Unpin {
    let mut len_bytes = [0u8; 4];
    match r.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    Ok(Some(Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_in_sequence() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            write_frame(&mut a, b"first").await.unwrap();
            write_frame(&mut a, b"").await.unwrap();
            write_frame(&mut a, &[7u8; 100]).await.unwrap();
        });
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), &b"first"[..]);
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap().len(), 0);
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap().len(), 100);
        writer.await.unwrap();
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(u32::MAX).to_le_bytes()).await.unwrap();
        assert!(matches!(read_frame(&mut b).await, Err(Error::FrameTooLarge(_))));
    }
}

//! The sending end of the framed channel.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN, Serialize};

/// Writes length prefixed frames into `W`.
///
/// The header buffer is kept between calls, borrowed payload tails are written
/// straight from the caller's memory.
pub struct FrameSender<W: AsyncWrite + Unpin> {
    tx: W,
    header: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            header: Vec::with_capacity(64),
        }
    }

    /// Sends `msg` as a single frame and flushes the writer.
    ///
    /// # Errors
    /// `InvalidInput` when the encoded message exceeds the frame limit, or the
    /// error of the underlying writer.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.header.clear();
        self.header.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let tail = msg.serialize(&mut self.header)?;
        let tail_len = tail.map_or(0, <[u8]>::len);
        let frame_len = self.header.len() - LEN_TYPE_SIZE + tail_len;

        if frame_len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {frame_len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
            ));
        }

        self.header[..LEN_TYPE_SIZE].copy_from_slice(&(frame_len as LenType).to_be_bytes());
        self.tx.write_all(&self.header).await?;

        if let Some(tail) = tail {
            self.tx.write_all(tail).await?;
        }

        self.tx.flush().await
    }
}

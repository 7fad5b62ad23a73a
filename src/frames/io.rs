use std::{io, marker::PhantomData};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Frame, FrameDecoder, FrameState};
use crate::{error::FrameError, role::RolePolicy};

/// Upper bound on a single read from the transport, so huge payloads are pulled in
/// pieces instead of reserving their full length up front.
const READ_CHUNK: usize = 16 * 1024;

/// Reads whole frames off an async byte stream.
pub struct FrameReader<R, P: RolePolicy> {
    reader: R,
    decoder: FrameDecoder<P>,
}

impl<R: AsyncRead + Unpin, P: RolePolicy> FrameReader<R, P> {
    pub fn new(reader: R, max_payload: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(max_payload),
        }
    }

    /// Waits until a full frame has arrived.
    ///
    /// Returns [`FrameError::Eof`] if the stream ends first, whether or not part of a
    /// frame was already received.
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        loop {
            if let FrameState::Complete(frame) = self.decoder.next_frame()? {
                return Ok(frame);
            }

            let want = self.decoder.bytes_wanted().clamp(1, READ_CHUNK);
            let buf = self.decoder.buffer_mut();
            buf.reserve(want);
            let n = self.reader.read_buf(buf).await?;
            if n == 0 {
                tracing::debug!(role = P::NAME, "stream closed");
                return Err(FrameError::Eof);
            }
            tracing::trace!(bytes = n, "read socket");
        }
    }
}

/// Writes frames to an async byte stream, masking them as the role requires.
pub struct FrameWriter<W, P: RolePolicy> {
    writer: W,
    _p: PhantomData<P>,
}

impl<W: AsyncWrite + Unpin, P: RolePolicy> FrameWriter<W, P> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            _p: PhantomData,
        }
    }

    /// Encodes `frame`, writes all of it and flushes.
    ///
    /// Servers always send unmasked frames; clients always send frames masked with a
    /// fresh random key.
    pub async fn send(&mut self, mut frame: Frame) -> io::Result<()> {
        frame.mask_key = if P::MASK_OUTGOING {
            let mut key = [0u8; 4];
            rand::fill(&mut key);
            Some(key)
        } else {
            None
        };
        self.send_raw(&frame.encode()).await
    }

    /// Writes bytes verbatim, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> { self.writer.shutdown().await }
}

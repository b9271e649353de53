use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use stompline_transport::StompStream;

use crate::codec::{decode_frame, parse_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pulls NUL-terminated frames off a byte stream.
///
/// Partial reads are buffered internally; callers only see complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// A reader with the default size limit.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame's text, without the NUL (blocking).
    ///
    /// Whitespace-only frames (heartbeat padding) are skipped. EOF, even in
    /// the middle of a frame, is [`FrameError::ConnectionClosed`].
    pub fn read_text(&mut self) -> Result<String> {
        loop {
            if let Some(raw) = decode_frame(&mut self.buf, self.config.max_frame_size)? {
                let text = String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8)?;
                if text.trim().is_empty() {
                    continue;
                }
                return Ok(text);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read and parse the next frame (blocking).
    pub fn read_frame(&mut self) -> Result<Frame> {
        let text = self.read_text()?;
        let frame = parse_frame(&text)?;
        tracing::debug!(command = %frame.command, size = text.len(), "frame received");
        Ok(frame)
    }
}

impl FrameReader<StompStream> {
    /// Create a frame reader for `StompStream` and apply read timeout from config.
    pub fn with_config_tcp(inner: StompStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: stompline_transport::TransportError) -> FrameError {
    match err {
        stompline_transport::TransportError::Io(io)
        | stompline_transport::TransportError::Connect { source: io, .. } => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

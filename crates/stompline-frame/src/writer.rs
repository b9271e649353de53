use std::io::{ErrorKind, Write};

use stompline_transport::StompStream;

use crate::codec::{Frame, FrameConfig, NUL};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Writes complete NUL-terminated frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: Vec<u8>,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// A writer that enforces `config.max_frame_size` on outgoing frames.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            config,
        }
    }

    /// Encode and write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_text(&frame.encode())?;
        tracing::debug!(command = %frame.command, "frame sent");
        Ok(())
    }

    /// Write already rendered frame text followed by the terminator.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        if text.len() > self.config.max_frame_size {
            return Err(FrameError::PayloadTooLarge {
                size: text.len(),
                max: self.config.max_frame_size,
            });
        }

        self.buf.clear();
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(NUL);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<StompStream> {
    /// Create a frame writer for `StompStream` and apply write timeout from config.
    pub fn with_config_tcp(inner: StompStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

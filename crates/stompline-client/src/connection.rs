use std::sync::Mutex;
use std::time::Duration;

use stompline_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use stompline_transport::StompStream;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::session::lock;

/// The frame transport both dispatch loops share.
///
/// Reads and writes are independently serialized, so a send never waits
/// behind a blocked receive.
pub trait Connection: Send + Sync {
    /// Open the transport to `addr` (`host:port`).
    fn open(&self, addr: &str) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Send one frame (blocking).
    fn send_frame(&self, frame: &Frame) -> Result<()>;

    /// Receive one frame (blocking).
    fn receive_frame(&self) -> Result<Frame>;

    /// Close the transport. Wakes up a blocked receive. Closing a closed
    /// transport is a no-op.
    fn close(&self);
}

/// [`Connection`] over a TCP stream with NUL-delimited frames.
pub struct TcpConnection {
    config: FrameConfig,
    connect_timeout: Duration,
    control: Mutex<Option<StompStream>>,
    reader: Mutex<Option<FrameReader<StompStream>>>,
    writer: Mutex<Option<FrameWriter<StompStream>>>,
}

impl TcpConnection {
    pub fn new(config: FrameConfig, connect_timeout: Duration) -> Self {
        Self {
            config,
            connect_timeout,
            control: Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }
}

impl Connection for TcpConnection {
    fn open(&self, addr: &str) -> Result<()> {
        let stream = stompline_transport::connect_timeout(addr, self.connect_timeout)?;
        let reader = FrameReader::with_config_tcp(stream.try_clone()?, self.config.clone())?;
        let writer = FrameWriter::with_config_tcp(stream.try_clone()?, self.config.clone())?;
        debug!(peer = ?stream.peer_addr().ok(), "connection opened");

        *lock(&self.reader) = Some(reader);
        *lock(&self.writer) = Some(writer);
        *lock(&self.control) = Some(stream);
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.control).is_some()
    }

    fn send_frame(&self, frame: &Frame) -> Result<()> {
        let mut writer = lock(&self.writer);
        let writer = writer.as_mut().ok_or_else(|| ClientError::SendFailed {
            command: frame.command.to_string(),
            source: FrameError::ConnectionClosed,
        })?;
        writer
            .write_frame(frame)
            .map_err(|source| ClientError::SendFailed {
                command: frame.command.to_string(),
                source,
            })
    }

    fn receive_frame(&self) -> Result<Frame> {
        let mut reader = lock(&self.reader);
        let reader = reader
            .as_mut()
            .ok_or(ClientError::Frame(FrameError::ConnectionClosed))?;
        Ok(reader.read_frame()?)
    }

    fn close(&self) {
        // Shut the socket down before touching the reader: a receive may be
        // blocked while holding the reader lock.
        let Some(control) = lock(&self.control).take() else {
            return;
        };
        if let Err(err) = control.shutdown() {
            debug!(error = %err, "socket shutdown failed");
        }
        lock(&self.writer).take();
        lock(&self.reader).take();
        info!("connection closed");
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("open", &self.is_open())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

use std::fmt::Write as _;

use bytes::{Buf, Bytes, BytesMut};

use crate::command::Command;
use crate::error::{FrameError, Result};

/// Frame terminator on the wire.
pub const NUL: u8 = 0;

/// Default maximum frame size: 1 MiB.
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// A STOMP frame: command, ordered headers, body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header, keeping insertion order.
    pub fn with_header(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.headers.push((key.into(), value.to_string()));
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn connect(accept_version: &str, host: &str, login: &str, passcode: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", accept_version)
            .with_header("host", host)
            .with_header("login", login)
            .with_header("passcode", passcode)
    }

    pub fn subscribe(destination: &str, id: u64, receipt: u64) -> Self {
        Self::new(Command::Subscribe)
            .with_header("destination", destination)
            .with_header("id", id)
            .with_header("receipt", receipt)
    }

    pub fn unsubscribe(id: u64, receipt: u64) -> Self {
        Self::new(Command::Unsubscribe)
            .with_header("id", id)
            .with_header("receipt", receipt)
    }

    pub fn disconnect(receipt: u64) -> Self {
        Self::new(Command::Disconnect).with_header("receipt", receipt)
    }

    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_body(body)
    }

    /// First value recorded for `key`, if any.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render the frame text, without the trailing NUL.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in &self.headers {
            let _ = writeln!(out, "{key}:{value}");
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// Parse one frame's text (NUL already stripped).
///
/// Leading newlines are skipped. Everything after the first blank line is
/// the body; a frame without a blank line has an empty body.
pub fn parse_frame(text: &str) -> Result<Frame> {
    let text = text
        .trim_end_matches(char::from(NUL))
        .trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Err(FrameError::Empty);
    }

    let (head, body) = match text.find("\n\n") {
        Some(idx) => (&text[..idx], &text[idx + 2..]),
        None => match text.find("\r\n\r\n") {
            Some(idx) => (&text[..idx], &text[idx + 4..]),
            None => (text, ""),
        },
    };

    let mut lines = head.lines();
    let keyword = lines.next().map(str::trim).unwrap_or_default();
    if keyword.is_empty() {
        return Err(FrameError::MissingCommand);
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        headers.push((key.to_string(), value.to_string()));
    }

    Ok(Frame {
        command: Command::parse(keyword),
        headers,
        body: body.to_string(),
    })
}

/// Split one NUL-terminated frame off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes and the terminator.
pub fn decode_frame(src: &mut BytesMut, max_frame: usize) -> Result<Option<Bytes>> {
    let Some(pos) = src.iter().position(|b| *b == NUL) else {
        if src.len() > max_frame {
            return Err(FrameError::PayloadTooLarge {
                size: src.len(),
                max: max_frame,
            });
        }
        return Ok(None); // Need more data
    };

    if pos > max_frame {
        return Err(FrameError::PayloadTooLarge {
            size: pos,
            max: max_frame,
        });
    }

    let frame = src.split_to(pos).freeze();
    src.advance(1);
    Ok(Some(frame))
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes. Default: 1 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

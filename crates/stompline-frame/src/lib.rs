//! STOMP text frames with NUL-delimited stream framing.
//!
//! A frame on the wire is:
//! - a command line (`SUBSCRIBE`, `MESSAGE`, ...)
//! - zero or more `key:value` header lines
//! - a blank line, then an optional body
//! - a single NUL byte
//!
//! [`FrameReader`] and [`FrameWriter`] deal with the byte stream; [`Frame`]
//! is the typed form the rest of stompline works with.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, parse_frame, Frame, FrameConfig, DEFAULT_MAX_FRAME, NUL};
pub use command::Command;
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

//! Line-oriented STOMP client for reporting and summarizing channel events.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connection setup and the shared stream type
//! - [`frame`]: NUL-terminated text frames, parsing and blocking I/O
//! - [`client`]: session state, command and inbound dispatch, reports and summaries
//!
//! The `stompline` binary (behind the `cli` feature, on by default) reads one
//! command per line from stdin and prints what happened.

/// Re-export transport types.
pub mod transport {
    pub use stompline_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use stompline_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use stompline_client::*;
}

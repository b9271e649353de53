//! TCP stream transport for the stompline client.
//!
//! This is the lowest layer of stompline. It knows nothing about frames;
//! everything else builds on top of the [`StompStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::StompStream;
pub use tcp::{connect, connect_timeout, split_host_port};

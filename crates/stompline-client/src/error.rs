use std::path::PathBuf;

use stompline_frame::FrameError;
use stompline_transport::TransportError;

/// Errors reported by client operations.
///
/// Every variant is handled where it is detected; none of them tear the
/// process down.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Wrong arity or bad token in a command line.
    #[error("{0}")]
    Usage(String),

    #[error("please login first")]
    NotConnected,

    #[error("the client is already logged in, log out before trying again")]
    AlreadyConnected,

    #[error("already subscribed to channel {0}")]
    AlreadySubscribed(String),

    #[error("you are not subscribed to channel {0}")]
    NotSubscribed(String),

    #[error("wrong password for user {0}")]
    WrongPassword(String),

    #[error("port '{0}' is not a number")]
    InvalidPort(String),

    /// `summary` for a channel that never received a message.
    #[error("no events were received on channel {0}")]
    UnknownChannel(String),

    #[error("unknown command '{command}'{hint}")]
    UnknownCommand { command: String, hint: &'static str },

    #[error("could not connect to server: {0}")]
    Transport(#[from] TransportError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("failed to send {command} frame: {source}")]
    SendFailed {
        command: String,
        #[source]
        source: FrameError,
    },

    /// The peer answered with an ERROR frame.
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected {0} frame in response to CONNECT")]
    UnexpectedResponse(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("failed to read events file {path}: {reason}")]
    EventsFile { path: PathBuf, reason: String },

    #[error("failed to write summary to {path}: {source}")]
    SummaryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;

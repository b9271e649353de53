use std::fmt;
use std::io;
use std::time::Duration;

use stompline::client::ClientError;
use stompline::frame::FrameError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;
/// Terminated by Ctrl-C (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::TimedOut => TRANSPORT_ERROR,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => USAGE,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

/// Exit code for a command that failed under `--fail-fast`.
pub fn client_error(err: &ClientError) -> CliError {
    let code = match err {
        ClientError::Usage(_)
        | ClientError::InvalidPort(_)
        | ClientError::UnknownCommand { .. } => USAGE,
        ClientError::Transport(_)
        | ClientError::SendFailed { .. }
        | ClientError::Frame(FrameError::Io(_) | FrameError::ConnectionClosed) => TRANSPORT_ERROR,
        ClientError::Frame(_) => INTERNAL,
        _ => FAILURE,
    };
    CliError::new(code, err.to_string())
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: '{input}'")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stompline_frame::{Command, Frame, FrameError};
use tracing::{debug, error, info, warn};

use crate::command::error_message;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::event::Event;
use crate::session::Session;

/// What the inbound loop did with one frame (or one failed receive).
#[derive(Debug)]
pub enum Inbound {
    /// A MESSAGE was stored in the event log.
    Message { channel: String, event: String },
    /// A MESSAGE that could not be stored, or a frame that failed to parse.
    Dropped { reason: String },
    /// A receipt other than the teardown receipt.
    Receipt { id: String },
    /// The teardown receipt arrived; the session is over.
    Disconnected,
    /// The server sent ERROR; the session is over.
    ServerError { message: String },
    /// Receiving failed; the session is over.
    ConnectionLost { error: ClientError },
    Unrecognized { command: String },
}

impl Inbound {
    /// `true` if this outcome ended the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::ServerError { .. } | Self::ConnectionLost { .. }
        )
    }
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { channel, event } => write!(f, "Received event '{event}' on {channel}"),
            Self::Dropped { reason } => write!(f, "Dropped message: {reason}"),
            Self::Receipt { id } => write!(f, "Receipt {id}"),
            Self::Disconnected => write!(f, "Logged out"),
            Self::ServerError { message } => write!(f, "Error from server: {message}"),
            Self::ConnectionLost { error } => write!(f, "Connection lost: {error}"),
            Self::Unrecognized { command } => write!(f, "Unrecognized frame type {command}"),
        }
    }
}

/// Consumes frames pushed by the server and applies them to the session.
pub struct InboundDispatcher<C: Connection> {
    session: Arc<Session>,
    connection: Arc<C>,
    gate_poll_interval: Duration,
}

impl<C: Connection> InboundDispatcher<C> {
    pub fn new(session: Arc<Session>, connection: Arc<C>, gate_poll_interval: Duration) -> Self {
        Self {
            session,
            connection,
            gate_poll_interval,
        }
    }

    /// Serve sessions until `shutdown` is set.
    ///
    /// Between sessions the loop is parked on the login gate; `observe` sees
    /// every outcome.
    pub fn run(&self, shutdown: &AtomicBool, mut observe: impl FnMut(&Inbound)) {
        while !shutdown.load(Ordering::SeqCst) {
            if !self
                .session
                .login_gate()
                .wait_released(self.gate_poll_interval)
            {
                continue;
            }
            self.serve_session(&mut observe);
        }
        debug!("inbound loop stopped");
    }

    /// Receive and dispatch frames until the current session terminates.
    ///
    /// Returns early without reading if the login gate is held.
    pub fn serve_session(&self, observe: &mut impl FnMut(&Inbound)) {
        while !self.session.is_terminated() {
            if self.session.login_gate().is_held() {
                return;
            }
            let outcome = match self.connection.receive_frame() {
                Ok(frame) => self.handle_frame(frame),
                Err(error) => match classify_recv_error(error) {
                    RecvErrorDisposition::Skip(error) => {
                        warn!(%error, "dropping unparseable frame");
                        Inbound::Dropped {
                            reason: error.to_string(),
                        }
                    }
                    RecvErrorDisposition::Fatal(error) => self.connection_lost(error),
                },
            };
            observe(&outcome);
        }
    }

    /// Apply one received frame.
    pub fn handle_frame(&self, frame: Frame) -> Inbound {
        match frame.command {
            Command::Message => self.on_message(&frame),
            Command::Receipt => self.on_receipt(&frame),
            Command::Error => {
                let message = error_message(&frame);
                error!(%message, "server sent ERROR");
                self.connection.close();
                self.session.fail();
                Inbound::ServerError { message }
            }
            other => {
                warn!(command = %other, "unrecognized frame type");
                Inbound::Unrecognized {
                    command: other.to_string(),
                }
            }
        }
    }

    fn on_message(&self, frame: &Frame) -> Inbound {
        let Some(channel) = frame.header("destination") else {
            warn!("MESSAGE without destination");
            return Inbound::Dropped {
                reason: "missing destination header".to_string(),
            };
        };
        match Event::from_body(&frame.body) {
            Ok(event) => {
                let name = event.name.clone();
                self.session.record_event(channel, event);
                debug!(%channel, event = %name, "event stored");
                Inbound::Message {
                    channel: channel.to_string(),
                    event: name,
                }
            }
            Err(err) => {
                warn!(%channel, error = %err, "dropping malformed MESSAGE");
                Inbound::Dropped {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn on_receipt(&self, frame: &Frame) -> Inbound {
        let id = frame.header("receipt-id").unwrap_or_default().to_string();
        let is_teardown = id
            .parse::<u64>()
            .ok()
            .is_some_and(|id| Some(id) == self.session.pending_disconnect());
        if !is_teardown {
            debug!(%id, "receipt");
            return Inbound::Receipt { id };
        }

        self.connection.close();
        self.session.complete_disconnect();
        info!(receipt = %id, "disconnected");
        Inbound::Disconnected
    }

    fn connection_lost(&self, error: ClientError) -> Inbound {
        error!(%error, "receive failed");
        self.connection.close();
        self.session.fail();
        Inbound::ConnectionLost { error }
    }
}

enum RecvErrorDisposition {
    /// The bad frame was consumed; the stream is still in sync.
    Skip(ClientError),
    Fatal(ClientError),
}

fn classify_recv_error(error: ClientError) -> RecvErrorDisposition {
    match error {
        ClientError::Frame(
            FrameError::Empty
            | FrameError::MissingCommand
            | FrameError::MalformedHeader(_)
            | FrameError::InvalidUtf8,
        ) => RecvErrorDisposition::Skip(error),
        other => RecvErrorDisposition::Fatal(other),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::error::Result;

    #[derive(Default)]
    struct ScriptedConnection {
        inbound: Mutex<VecDeque<Result<Frame>>>,
        closed: AtomicBool,
    }

    impl Connection for ScriptedConnection {
        fn open(&self, _addr: &str) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn send_frame(&self, _frame: &Frame) -> Result<()> {
            Ok(())
        }

        fn receive_frame(&self) -> Result<Frame> {
            self.inbound
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ClientError::Frame(FrameError::ConnectionClosed)))
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn dispatcher(
        frames: Vec<Frame>,
    ) -> (InboundDispatcher<ScriptedConnection>, Arc<ScriptedConnection>) {
        scripted(frames.into_iter().map(Ok).collect())
    }

    fn scripted(
        inbound: Vec<Result<Frame>>,
    ) -> (InboundDispatcher<ScriptedConnection>, Arc<ScriptedConnection>) {
        let connection = Arc::new(ScriptedConnection {
            inbound: Mutex::new(inbound.into()),
            closed: AtomicBool::new(false),
        });
        let session = Arc::new(Session::new());
        session.complete_login("alice", "secret");
        let dispatcher =
            InboundDispatcher::new(session, Arc::clone(&connection), Duration::from_millis(5));
        (dispatcher, connection)
    }

    fn message(channel: &str, body: &str) -> Frame {
        Frame::new(Command::Message)
            .with_header("destination", channel)
            .with_body(body)
    }

    #[test]
    fn message_is_stored() {
        let (dispatcher, _) = dispatcher(Vec::new());
        let outcome = dispatcher.handle_frame(message(
            "sports",
            "user:alice\nevent name:Goal\ncity:Haifa\ndate time:5\n\
             description:x\ngeneral information:\n",
        ));

        assert!(matches!(outcome, Inbound::Message { ref channel, .. } if channel == "sports"));
        assert_eq!(dispatcher.session.event_counts().get("sports"), Some(&1));
    }

    #[test]
    fn malformed_message_is_dropped() {
        let (dispatcher, _) = dispatcher(Vec::new());
        let outcome = dispatcher.handle_frame(message("sports", "city:nowhere\n"));
        assert!(matches!(outcome, Inbound::Dropped { .. }));

        let outcome = dispatcher
            .handle_frame(Frame::new(Command::Message).with_body("event name:x\ndate time:1\n"));
        assert!(matches!(outcome, Inbound::Dropped { .. }));
        assert!(dispatcher.session.event_counts().is_empty());
    }

    #[test]
    fn subscribe_receipt_is_ignored() {
        let (dispatcher, connection) = dispatcher(Vec::new());
        dispatcher.session.begin_disconnect();

        let outcome =
            dispatcher.handle_frame(Frame::new(Command::Receipt).with_header("receipt-id", "7"));
        assert!(matches!(outcome, Inbound::Receipt { ref id } if id == "7"));
        assert!(dispatcher.session.is_connected());
        assert!(connection.is_open());
    }

    #[test]
    fn teardown_receipt_disconnects() {
        let (dispatcher, connection) = dispatcher(Vec::new());
        let receipt = dispatcher.session.begin_disconnect();

        let outcome = dispatcher.handle_frame(
            Frame::new(Command::Receipt).with_header("receipt-id", receipt.to_string()),
        );
        assert!(matches!(outcome, Inbound::Disconnected));
        assert!(outcome.is_terminal());
        assert!(!dispatcher.session.is_connected());
        assert!(dispatcher.session.is_terminated());
        assert!(!connection.is_open());
    }

    #[test]
    fn error_frame_is_fatal() {
        let (dispatcher, connection) = dispatcher(Vec::new());
        let outcome = dispatcher.handle_frame(
            Frame::new(Command::Error).with_header("message", "Incorrect password"),
        );

        assert!(matches!(
            outcome,
            Inbound::ServerError { ref message } if message == "Incorrect password"
        ));
        assert!(!dispatcher.session.is_connected());
        assert!(dispatcher.session.login_gate().is_held());
        assert!(!connection.is_open());
    }

    #[test]
    fn unknown_frame_type_is_reported() {
        let (dispatcher, _) = dispatcher(Vec::new());
        let outcome = dispatcher.handle_frame(Frame::new(Command::Other("PING".to_string())));
        assert!(matches!(outcome, Inbound::Unrecognized { ref command } if command == "PING"));
        assert!(dispatcher.session.is_connected());
    }

    #[test]
    fn serve_session_runs_until_receipt() {
        let frames = vec![
            message("news", "event name:a\ndate time:1\n"),
            Frame::new(Command::Receipt).with_header("receipt-id", "0"),
            message("news", "event name:never read\ndate time:2\n"),
        ];
        let (dispatcher, connection) = dispatcher(frames);
        assert_eq!(dispatcher.session.begin_disconnect(), 0);

        let mut seen = Vec::new();
        dispatcher.serve_session(&mut |outcome: &Inbound| seen.push(outcome.to_string()));

        assert_eq!(seen, vec!["Received event 'a' on news", "Logged out"]);
        assert_eq!(connection.inbound.lock().unwrap().len(), 1);
    }

    #[test]
    fn read_failure_ends_session() {
        let (dispatcher, _) = dispatcher(Vec::new());
        let mut terminal = 0;
        dispatcher.serve_session(&mut |outcome: &Inbound| {
            if outcome.is_terminal() {
                terminal += 1;
            }
        });
        assert_eq!(terminal, 1);
        assert!(!dispatcher.session.is_connected());
    }

    #[test]
    fn unparseable_frame_is_skipped_and_next_message_is_read() {
        let malformed = FrameError::MalformedHeader("no-colon-header".to_string());
        let (dispatcher, connection) = scripted(vec![
            Err(ClientError::Frame(malformed)),
            Err(ClientError::Frame(FrameError::InvalidUtf8)),
            Ok(message("sports", "event name:Goal\ndate time:5\n")),
        ]);

        let mut seen = Vec::new();
        dispatcher.serve_session(&mut |outcome: &Inbound| seen.push(outcome.to_string()));

        assert_eq!(
            seen,
            vec![
                "Dropped message: frame error: malformed header line 'no-colon-header'",
                "Dropped message: frame error: frame is not valid UTF-8",
                "Received event 'Goal' on sports",
                "Connection lost: frame error: connection closed (incomplete frame)",
            ]
        );
        assert_eq!(dispatcher.session.event_counts().get("sports"), Some(&1));
        assert!(!connection.is_open());
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let (dispatcher, connection) = scripted(vec![
            Err(ClientError::Frame(FrameError::PayloadTooLarge {
                size: 10,
                max: 4,
            })),
            Ok(message("sports", "event name:never read\ndate time:1\n")),
        ]);

        let mut seen = Vec::new();
        dispatcher.serve_session(&mut |outcome: &Inbound| seen.push(outcome.is_terminal()));

        assert_eq!(seen, vec![true]);
        assert!(!dispatcher.session.is_connected());
        assert!(!connection.is_open());
        assert_eq!(connection.inbound.lock().unwrap().len(), 1);
    }

    #[test]
    fn run_stops_on_shutdown_while_gate_is_held() {
        let (dispatcher, _) = dispatcher(Vec::new());
        dispatcher.session.fail();

        let shutdown = Arc::new(AtomicBool::new(false));
        let stopper = {
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                shutdown.store(true, Ordering::SeqCst);
            })
        };

        let mut seen = 0;
        dispatcher.run(&shutdown, |_| seen += 1);
        stopper.join().unwrap();
        assert_eq!(seen, 0);
    }
}

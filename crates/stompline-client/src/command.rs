use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use stompline_frame::{Command, Frame};
use stompline_transport::split_host_port;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::report;
use crate::session::Session;

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Login {
        host: String,
        port: u16,
        username: String,
        password: String,
    },
    Join {
        channel: String,
    },
    Exit {
        channel: String,
    },
    Logout,
    Report {
        path: PathBuf,
    },
    Summary {
        channel: String,
        user: String,
        path: PathBuf,
    },
}

impl UserCommand {
    /// Parse a space-separated command line. Blank lines yield `Ok(None)`.
    ///
    /// Unknown commands are reported without a login hint; the dispatcher
    /// adds it when there is no session.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match name {
            "login" => {
                let [host_port, username, password] = args else {
                    return Err(usage(
                        "login command needs 3 args: {host:port} {username} {password}",
                    ));
                };
                let (host, port) = split_host_port(host_port)
                    .ok_or_else(|| usage("login command needs {host:port} as its first arg"))?;
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ClientError::InvalidPort(port.to_string()))?;
                Self::Login {
                    host: host.to_string(),
                    port,
                    username: username.to_string(),
                    password: password.to_string(),
                }
            }
            "join" => {
                let [channel] = args else {
                    return Err(usage("join command needs 1 args: {channel_name}"));
                };
                Self::Join {
                    channel: channel.to_string(),
                }
            }
            "exit" => {
                let [channel] = args else {
                    return Err(usage("exit command needs 1 args: {channel_name}"));
                };
                Self::Exit {
                    channel: channel.to_string(),
                }
            }
            "logout" => {
                if !args.is_empty() {
                    return Err(usage("logout command needs 0 args"));
                }
                Self::Logout
            }
            "report" => {
                let [path] = args else {
                    return Err(usage("report command needs 1 args: {file}"));
                };
                Self::Report {
                    path: PathBuf::from(*path),
                }
            }
            "summary" => {
                let [channel, user, path] = args else {
                    return Err(usage(
                        "summary command needs 3 args: {channel_name} {user} {file}",
                    ));
                };
                Self::Summary {
                    channel: channel.to_string(),
                    user: user.to_string(),
                    path: PathBuf::from(*path),
                }
            }
            other => {
                return Err(ClientError::UnknownCommand {
                    command: other.to_string(),
                    hint: "",
                })
            }
        };

        Ok(Some(command))
    }
}

fn usage(message: &str) -> ClientError {
    ClientError::Usage(message.to_string())
}

/// What a successfully handled command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Blank input line.
    Nothing,
    LoggedIn { username: String },
    Joined { channel: String },
    Exited { channel: String },
    /// DISCONNECT sent; teardown happens when the receipt arrives.
    LogoutRequested,
    Reported { channel: String, count: usize },
    SummaryWritten { channel: String, count: usize, path: PathBuf },
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => Ok(()),
            Self::LoggedIn { .. } => write!(f, "Login successful"),
            Self::Joined { channel } => write!(f, "Joined channel {channel}"),
            Self::Exited { channel } => write!(f, "Exited channel {channel}"),
            Self::LogoutRequested => write!(f, "Logging out"),
            Self::Reported { channel, count } => {
                write!(f, "Reported {count} events to channel {channel}")
            }
            Self::SummaryWritten {
                channel,
                count,
                path,
            } => write!(
                f,
                "Wrote summary of {count} events on channel {channel} to {}",
                path.display()
            ),
        }
    }
}

/// Runs user commands against the shared session and connection.
pub struct CommandDispatcher<C: Connection> {
    session: Arc<Session>,
    connection: Arc<C>,
    config: ClientConfig,
}

impl<C: Connection> CommandDispatcher<C> {
    pub fn new(session: Arc<Session>, connection: Arc<C>, config: ClientConfig) -> Self {
        Self {
            session,
            connection,
            config,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Parse and execute one line of user input.
    pub fn handle_line(&self, line: &str) -> Result<CommandOutcome> {
        let command = match UserCommand::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(CommandOutcome::Nothing),
            Err(ClientError::UnknownCommand { command, .. }) => {
                let hint = if self.session.is_connected() {
                    ""
                } else {
                    "; please login first"
                };
                warn!(%command, "unrecognized command");
                return Err(ClientError::UnknownCommand { command, hint });
            }
            Err(err) => return Err(err),
        };
        self.execute(command)
    }

    pub fn execute(&self, command: UserCommand) -> Result<CommandOutcome> {
        match command {
            UserCommand::Login {
                host,
                port,
                username,
                password,
            } => self.login(&host, port, &username, &password),
            UserCommand::Join { channel } => self.join(&channel),
            UserCommand::Exit { channel } => self.exit(&channel),
            UserCommand::Logout => self.logout(),
            UserCommand::Report { path } => {
                self.require_connected()?;
                let (channel, count) =
                    report::report(&self.session, self.connection.as_ref(), &path)?;
                Ok(CommandOutcome::Reported { channel, count })
            }
            UserCommand::Summary {
                channel,
                user,
                path,
            } => {
                let count = report::write_summary(&self.session, &channel, &user, &path)?;
                Ok(CommandOutcome::SummaryWritten {
                    channel,
                    count,
                    path,
                })
            }
        }
    }

    /// CONNECT and consume the response inline, while the login gate keeps
    /// the inbound loop parked.
    fn login(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<CommandOutcome> {
        if self.session.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        if !self.session.credentials_match(username, password) {
            return Err(ClientError::WrongPassword(username.to_string()));
        }
        debug_assert!(self.session.login_gate().is_held());

        if !self.connection.is_open() {
            self.connection.open(&format!("{host}:{port}"))?;
        }

        let connect = Frame::connect(
            &self.config.accept_version,
            &self.config.virtual_host,
            username,
            password,
        );
        if let Err(err) = self.connection.send_frame(&connect) {
            self.connection.close();
            return Err(err);
        }

        let response = match self.connection.receive_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.connection.close();
                return Err(err);
            }
        };

        match response.command {
            Command::Connected => {
                self.session.complete_login(username, password);
                info!(%username, %host, port, "logged in");
                Ok(CommandOutcome::LoggedIn {
                    username: username.to_string(),
                })
            }
            Command::Error => {
                self.connection.close();
                Err(ClientError::Server(error_message(&response)))
            }
            other => {
                self.connection.close();
                Err(ClientError::UnexpectedResponse(other.to_string()))
            }
        }
    }

    fn join(&self, channel: &str) -> Result<CommandOutcome> {
        self.require_connected()?;
        let mut subscriptions = self.session.subscriptions();
        if subscriptions.contains(channel) {
            return Err(ClientError::AlreadySubscribed(channel.to_string()));
        }

        let id = self.session.subscription_ids().next_id();
        let receipt = self.session.receipt_ids().next_id();
        self.connection
            .send_frame(&Frame::subscribe(channel, id, receipt))?;
        subscriptions.insert(channel, id);
        debug!(%channel, id, receipt, "subscribed");
        Ok(CommandOutcome::Joined {
            channel: channel.to_string(),
        })
    }

    fn exit(&self, channel: &str) -> Result<CommandOutcome> {
        self.require_connected()?;
        let mut subscriptions = self.session.subscriptions();
        let id = subscriptions
            .get(channel)
            .ok_or_else(|| ClientError::NotSubscribed(channel.to_string()))?;

        let receipt = self.session.receipt_ids().next_id();
        self.connection.send_frame(&Frame::unsubscribe(id, receipt))?;
        // Removed on send; the UNSUBSCRIBE receipt is not waited for.
        subscriptions.remove(channel);
        debug!(%channel, id, receipt, "unsubscribed");
        Ok(CommandOutcome::Exited {
            channel: channel.to_string(),
        })
    }

    fn logout(&self) -> Result<CommandOutcome> {
        self.require_connected()?;
        let receipt = self.session.begin_disconnect();
        if let Err(err) = self.connection.send_frame(&Frame::disconnect(receipt)) {
            self.session.abandon_disconnect();
            return Err(err);
        }
        info!(receipt, "disconnect requested");
        Ok(CommandOutcome::LogoutRequested)
    }

    fn require_connected(&self) -> Result<()> {
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }
}

/// Diagnostic text of an ERROR frame: the body, or the `message` header
/// when the body is empty.
pub(crate) fn error_message(frame: &Frame) -> String {
    let body = frame.body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    frame
        .header("message")
        .map(str::to_string)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_login() {
        assert_eq!(
            UserCommand::parse("login 127.0.0.1:7777 alice secret").unwrap(),
            Some(UserCommand::Login {
                host: "127.0.0.1".to_string(),
                port: 7777,
                username: "alice".to_string(),
                password: "secret".to_string(),
            })
        );
    }

    #[test]
    fn parse_login_rejections() {
        assert!(matches!(
            UserCommand::parse("login 127.0.0.1:7777 alice"),
            Err(ClientError::Usage(_))
        ));
        assert!(matches!(
            UserCommand::parse("login 127.0.0.1 7777 alice secret"),
            Err(ClientError::Usage(_))
        ));
        assert!(matches!(
            UserCommand::parse("login 127.0.0.1 alice secret"),
            Err(ClientError::Usage(_))
        ));
        assert!(matches!(
            UserCommand::parse("login 127.0.0.1:port alice secret"),
            Err(ClientError::InvalidPort(port)) if port == "port"
        ));
    }

    #[test]
    fn parse_other_commands() {
        assert_eq!(
            UserCommand::parse("  join   sports ").unwrap(),
            Some(UserCommand::Join {
                channel: "sports".to_string()
            })
        );
        assert_eq!(
            UserCommand::parse("summary sports alice out.txt").unwrap(),
            Some(UserCommand::Summary {
                channel: "sports".to_string(),
                user: "alice".to_string(),
                path: PathBuf::from("out.txt"),
            })
        );
        assert_eq!(UserCommand::parse("logout").unwrap(), Some(UserCommand::Logout));
        assert_eq!(UserCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn parse_arity_errors() {
        for line in ["join", "exit a b", "logout now", "report", "summary a b"] {
            assert!(
                matches!(UserCommand::parse(line), Err(ClientError::Usage(_))),
                "{line} should be a usage error"
            );
        }
    }

    #[test]
    fn parse_unknown_command() {
        assert!(matches!(
            UserCommand::parse("dance now"),
            Err(ClientError::UnknownCommand { command, .. }) if command == "dance"
        ));
    }

    #[test]
    fn error_message_prefers_body() {
        let with_body = Frame::new(Command::Error)
            .with_header("message", "short")
            .with_body("long explanation\n");
        assert_eq!(error_message(&with_body), "long explanation");

        let header_only = Frame::new(Command::Error).with_header("message", "bad passcode");
        assert_eq!(error_message(&header_only), "bad passcode");
        assert_eq!(error_message(&Frame::new(Command::Error)), "unknown error");
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(
            CommandOutcome::Joined {
                channel: "sports".to_string()
            }
            .to_string(),
            "Joined channel sports"
        );
        assert_eq!(CommandOutcome::Nothing.to_string(), "");
    }
}

mod exit;
mod logging;
mod shell;

use clap::Parser;
use stompline::client::ClientConfig;

use crate::exit::{parse_duration, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "stompline",
    version,
    about = "Report and summarize channel events over STOMP",
    long_about = "Reads one command per line from stdin:\n  \
        login {host:port} {user} {password}\n  join {channel}\n  exit {channel}\n  \
        report {file}\n  summary {channel} {user} {file}\n  logout"
)]
struct Cli {
    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "STOMPLINE_LOG_LEVEL"
    )]
    log_level: LogLevel,

    /// Value of the CONNECT `host` header.
    #[arg(
        long,
        value_name = "HOST",
        default_value = "stomp.cs.bgu.ac.il",
        env = "STOMPLINE_VIRTUAL_HOST"
    )]
    virtual_host: String,

    /// Value of the CONNECT `accept-version` header.
    #[arg(long, value_name = "VERSION", default_value = "1.2")]
    accept_version: String,

    /// TCP connect timeout (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s")]
    connect_timeout: String,

    /// Stop at the first failing command and exit with its code.
    #[arg(long)]
    fail_fast: bool,
}

impl Cli {
    fn client_config(&self) -> CliResult<ClientConfig> {
        Ok(ClientConfig {
            accept_version: self.accept_version.clone(),
            virtual_host: self.virtual_host.clone(),
            connect_timeout: parse_duration(&self.connect_timeout)?,
            ..ClientConfig::default()
        })
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let result = cli
        .client_config()
        .and_then(|config| shell::run(config, cli.fail_fast));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_match_client_config() {
        let cli = Cli::try_parse_from(["stompline"]).expect("no args should parse");
        let config = cli.client_config().unwrap();
        let defaults = ClientConfig::default();

        assert_eq!(config.accept_version, defaults.accept_version);
        assert_eq!(config.virtual_host, defaults.virtual_host);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!cli.fail_fast);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn parses_connection_overrides() {
        let cli = Cli::try_parse_from([
            "stompline",
            "--virtual-host",
            "localhost",
            "--accept-version",
            "1.1",
            "--connect-timeout",
            "250ms",
            "--log-format",
            "json",
            "--log-level",
            "debug",
            "--fail-fast",
        ])
        .expect("overrides should parse");

        let config = cli.client_config().unwrap();
        assert_eq!(config.virtual_host, "localhost");
        assert_eq!(config.accept_version, "1.1");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.fail_fast);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = Cli::try_parse_from(["stompline", "--log-level", "loud"])
            .expect_err("bad level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn invalid_timeout_is_a_usage_error() {
        let cli = Cli::try_parse_from(["stompline", "--connect-timeout", "soon"]).unwrap();
        let err = cli.client_config().unwrap_err();
        assert_eq!(err.code, exit::USAGE);
    }
}

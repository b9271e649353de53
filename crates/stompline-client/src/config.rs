use std::time::Duration;

use stompline_frame::FrameConfig;

/// Client-wide settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Value of the CONNECT `accept-version` header.
    pub accept_version: String,
    /// Value of the CONNECT `host` header. The server checks it; the TCP
    /// endpoint comes from the `login` command instead.
    pub virtual_host: String,
    /// Timeout for opening the TCP connection.
    pub connect_timeout: Duration,
    /// How long the inbound loop waits on the login gate before
    /// re-checking for shutdown.
    pub gate_poll_interval: Duration,
    /// Frame size limit and socket timeouts.
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            accept_version: "1.2".to_string(),
            virtual_host: "stomp.cs.bgu.ac.il".to_string(),
            connect_timeout: Duration::from_secs(5),
            gate_poll_interval: Duration::from_millis(100),
            frame: FrameConfig::default(),
        }
    }
}

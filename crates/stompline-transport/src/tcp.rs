use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::StompStream;

/// Connect to `addr` (`host:port`) without a connect timeout (blocking).
pub fn connect(addr: &str) -> Result<StompStream> {
    let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    info!(%addr, "connected");
    Ok(StompStream::from_tcp(stream))
}

/// Connect to `addr` (`host:port`), trying each resolved address in turn.
///
/// The last connect error is reported if every address fails.
pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<StompStream> {
    let candidates = addr
        .to_socket_addrs()
        .map_err(|_| TransportError::InvalidAddress(addr.to_string()))?;

    let mut last_err = None;
    for candidate in candidates {
        debug!(%candidate, "trying address");
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                info!(%addr, %candidate, "connected");
                return Ok(StompStream::from_tcp(stream));
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        }),
    })
}

/// Split a `host:port` token into its parts.
///
/// Returns `None` unless there is exactly one `:` with non-empty text on
/// both sides. The port is returned unparsed so callers can report a
/// non-numeric port distinctly.
pub fn split_host_port(token: &str) -> Option<(&str, &str)> {
    let (host, port) = token.split_once(':')?;
    if host.is_empty() || port.is_empty() || port.contains(':') {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = std::thread::spawn(move || {
            let mut client = connect_timeout(&addr, Duration::from_secs(2)).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let (mut server, _) = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn peer_addr_is_the_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local = listener.local_addr().unwrap();

        let client = connect(&local.to_string()).unwrap();
        let _server = listener.accept().unwrap();

        assert_eq!(client.peer_addr().unwrap(), local);
        assert!(format!("{client:?}").contains(&local.to_string()));
    }

    #[test]
    fn connect_refused_reports_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = connect(&addr).unwrap_err();
        assert!(matches!(err, TransportError::Connect { addr: ref a, .. } if *a == addr));
    }

    #[test]
    fn unresolvable_address_is_invalid() {
        let err = connect_timeout("not an address", Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress(_)));
    }

    #[test]
    fn shutdown_wakes_blocked_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let client = connect(&addr).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let mut reader = client.try_clone().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            reader.read(&mut buf).unwrap()
        });

        client.shutdown().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
        client.shutdown().unwrap();
    }

    #[test]
    fn split_host_port_cases() {
        assert_eq!(split_host_port("127.0.0.1:7777"), Some(("127.0.0.1", "7777")));
        assert_eq!(split_host_port("localhost:abc"), Some(("localhost", "abc")));
        assert_eq!(split_host_port("127.0.0.1"), None);
        assert_eq!(split_host_port(":7777"), None);
        assert_eq!(split_host_port("host:"), None);
        assert_eq!(split_host_port("a:b:c"), None);
    }
}

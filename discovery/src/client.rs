/*!
    One-shot TCP request client.
*/

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::{report, DiscoveryError, ErrorCallback, Result, IO_TIMEOUT};

/**
    Connects to a discovered peer, sends one request, and reads the reply
    until the remote closes the connection. The reply is delivered to the
    client callback exactly once per [`Client::transact`].
*/
pub struct Client {
    client_callback: Arc<dyn Fn(&[u8]) + Send + Sync>,
    error_callback: Option<ErrorCallback>,
}

impl Client {
    pub fn new(client_callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        Self {
            client_callback: Arc::new(client_callback),
            error_callback: None,
        }
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    /**
        Connect to `(ip, port)` with the five-second deadline, send
        `request`, and deliver the full response. Errors are both reported
        through the error callback and returned.
    */
    pub fn transact(&self, ip: &str, port: u16, request: &[u8]) -> Result<()> {
        match self.try_transact(ip, port, request) {
            Ok(()) => Ok(()),
            Err(e) => {
                report(&self.error_callback, &format!("client error: {e}"));
                Err(e)
            }
        }
    }

    fn try_transact(&self, ip: &str, port: u16, request: &[u8]) -> Result<()> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|_| DiscoveryError::InvalidAddress(format!("{ip}:{port}")))?;

        let mut stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                DiscoveryError::Timeout
            } else {
                DiscoveryError::Socket(e)
            }
        })?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        stream.write_all(request)?;
        stream.flush()?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        (self.client_callback)(&response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_address() {
        let client = Client::new(|_response| {});
        let err = client.transact("nonsense", 1, b"x").unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidAddress(_)));
    }

    #[test]
    fn connection_refused_is_reported() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let mut client = Client::new(|_response| {});
        let reported = Arc::new(AtomicBool::new(false));
        {
            let reported = Arc::clone(&reported);
            client.set_error_callback(Arc::new(move |_msg| {
                reported.store(true, Ordering::Relaxed);
            }));
        }
        // a port nothing listens on: bind-then-drop frees it
        let port = {
            let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            sock.local_addr().unwrap().port()
        };
        assert!(client.transact("127.0.0.1", port, b"x").is_err());
        assert!(reported.load(Ordering::Relaxed));
    }
}

/*!
    One-request-per-connection TCP server.
*/

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::{report, DiscoveryError, ErrorCallback, Result, IO_TIMEOUT};

/// Accept-loop poll interval while waiting for connections.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/**
    Serves discovery follow-up requests.

    A dispatch thread accepts connections between [`Server::start`] and
    [`Server::stop`]. Each connection carries one CRLF-terminated request
    line; the server callback maps the stripped request to the response
    bytes, which are written back before the connection closes.
*/
pub struct Server {
    addr: SocketAddr,
    server_callback: Arc<dyn Fn(&str) -> Vec<u8> + Send + Sync>,
    error_callback: Option<ErrorCallback>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(
        ip: &str,
        port: u16,
        server_callback: impl Fn(&str) -> Vec<u8> + Send + Sync + 'static,
    ) -> Result<Self> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|_| DiscoveryError::InvalidAddress(format!("{ip}:{port}")))?;
        Ok(Self {
            addr,
            server_callback: Arc::new(server_callback),
            error_callback: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    /// The bound address; useful when constructed with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(DiscoveryError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.addr)?;
        self.addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let serve = Arc::clone(&self.server_callback);
        let error = self.error_callback.clone();

        self.worker = Some(std::thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                match listener.accept() {
                    Ok((stream, _peer)) => {
                        if let Err(e) = handle_connection(stream, serve.as_ref()) {
                            report(&error, &format!("server connection error: {e}"));
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(ACCEPT_POLL);
                    }
                    Err(e) => {
                        report(&error, &format!("server accept error: {e}"));
                        std::thread::sleep(ACCEPT_POLL);
                    }
                }
            }
        }));
        Ok(())
    }

    /// Stop the dispatch thread. Returns within the accept poll interval.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                report(&self.error_callback, "server thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read one CRLF-terminated request, strip the terminator, respond.
fn handle_connection(
    mut stream: TcpStream,
    serve: &(dyn Fn(&str) -> Vec<u8> + Send + Sync),
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    let deadline = Instant::now() + IO_TIMEOUT;
    loop {
        if Instant::now() > deadline {
            return Err(std::io::ErrorKind::TimedOut.into());
        }
        match stream.read(&mut byte)? {
            0 => break,
            _ => {
                request.push(byte[0]);
                if request.ends_with(b"\r\n") {
                    break;
                }
            }
        }
    }
    while request.ends_with(b"\r\n") {
        request.truncate(request.len() - 2);
    }

    let request = String::from_utf8_lossy(&request).into_owned();
    let response = serve(&request);
    stream.write_all(&response)?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Client;
    use std::sync::Mutex;
    use std::time::Instant;

    #[test]
    fn serves_a_client_round_trip() {
        let mut server = Server::new("127.0.0.1", 0, |request: &str| {
            format!("echo:{request}").into_bytes()
        })
        .unwrap();
        server.start().unwrap();
        let port = server.local_addr().port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let client = {
            let received = Arc::clone(&received);
            Client::new(move |response: &[u8]| {
                received.lock().unwrap().extend_from_slice(response);
            })
        };

        client
            .transact("127.0.0.1", port, b"who-is-there\r\n")
            .unwrap();
        assert_eq!(received.lock().unwrap().as_slice(), b"echo:who-is-there");

        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn trailing_crlf_is_stripped_exactly_once_per_line() {
        let seen = Arc::new(Mutex::new(String::new()));
        let mut server = {
            let seen = Arc::clone(&seen);
            Server::new("127.0.0.1", 0, move |request: &str| {
                *seen.lock().unwrap() = request.to_string();
                b"ok".to_vec()
            })
            .unwrap()
        };
        server.start().unwrap();
        let port = server.local_addr().port();

        let client = Client::new(|_response| {});
        client.transact("127.0.0.1", port, b"hello\r\n").unwrap();
        assert_eq!(seen.lock().unwrap().as_str(), "hello");
        server.stop();
    }

    #[test]
    fn stop_returns_within_the_deadline() {
        let mut server = Server::new("127.0.0.1", 0, |_request: &str| Vec::new()).unwrap();
        server.start().unwrap();
        let begin = Instant::now();
        server.stop();
        assert!(begin.elapsed() < IO_TIMEOUT);
    }
}

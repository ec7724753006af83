/*!
    Multicast announcement receiver.
*/

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::{
    report, DiscoveryError, ErrorCallback, Result, DISCOVERY_PORT, MULTICAST_GROUP,
};

const MAX_DATAGRAM: usize = 1024;
/// Receive timeout; the receiver thread checks the stop flag this often.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/**
    Listens for discovery announcements on the multicast group.

    Joins the group on each provided interface and runs a receiver thread
    between [`Listener::start`] and [`Listener::stop`]; each datagram is
    delivered to the listen callback as a string.
*/
pub struct Listener {
    interface_addrs: Vec<Ipv4Addr>,
    listen_callback: Arc<dyn Fn(String) + Send + Sync>,
    error_callback: Option<ErrorCallback>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("interface_addrs", &self.interface_addrs)
            .field("error_callback", &self.error_callback.is_some())
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

impl Listener {
    pub fn new(
        interface_addrs: &[String],
        listen_callback: impl Fn(String) + Send + Sync + 'static,
    ) -> Result<Self> {
        let mut addrs = Vec::with_capacity(interface_addrs.len());
        for addr in interface_addrs {
            addrs.push(
                addr.parse()
                    .map_err(|_| DiscoveryError::InvalidAddress(addr.clone()))?,
            );
        }
        Ok(Self {
            interface_addrs: addrs,
            listen_callback: Arc::new(listen_callback),
            error_callback: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    /// Bind, join the group on every interface, and start receiving.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(DiscoveryError::AlreadyRunning);
        }

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT))?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        for addr in &self.interface_addrs {
            socket.join_multicast_v4(&MULTICAST_GROUP, addr)?;
        }

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let listen = Arc::clone(&self.listen_callback);
        let error = self.error_callback.clone();

        self.worker = Some(std::thread::spawn(move || {
            let mut buf = [0u8; MAX_DATAGRAM];
            while !stop.load(Ordering::Acquire) {
                match socket.recv_from(&mut buf) {
                    Ok((len, _from)) => {
                        let message = String::from_utf8_lossy(&buf[..len]).into_owned();
                        listen(message);
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        // timeout tick; re-check the stop flag
                    }
                    Err(e) => {
                        report(&error, &format!("listener receive failed: {e}"));
                    }
                }
            }
        }));
        Ok(())
    }

    /// Stop the receiver thread. Returns within the poll interval.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                report(&self.error_callback, "listener thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn start_twice_is_rejected() {
        let mut listener = Listener::new(&[], |_msg| {}).unwrap();
        if listener.start().is_err() {
            // binding the shared discovery port can fail on busy test
            // hosts; nothing further to assert in that case
            return;
        }
        assert!(matches!(
            listener.start(),
            Err(DiscoveryError::AlreadyRunning)
        ));
        listener.stop();
        assert!(!listener.is_running());
    }

    #[test]
    fn stop_returns_promptly() {
        let mut listener = Listener::new(&[], |_msg| {}).unwrap();
        if listener.start().is_err() {
            return;
        }
        let begin = Instant::now();
        listener.stop();
        assert!(begin.elapsed() < crate::IO_TIMEOUT);
    }

    #[test]
    fn rejects_bad_interface_address() {
        let err = Listener::new(&["256.0.0.1#".to_string()], |_msg| {}).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidAddress(_)));
    }
}

/*!
    Multicast announcement sender.
*/

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::{report, DiscoveryError, ErrorCallback, Result, DISCOVERY_PORT, MULTICAST_GROUP};

/**
    Sends discovery announcements to the multicast group on a set of
    network interfaces.

    One socket is created per interface, bound to that interface's
    address so outgoing multicast leaves through it. Loopback is disabled
    until [`Broadcaster::enable_loopback`] turns it on — a host normally
    has no reason to hear its own announcements.
*/
pub struct Broadcaster {
    sockets: Vec<UdpSocket>,
    error_callback: Option<ErrorCallback>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("sockets", &self.sockets)
            .field("error_callback", &self.error_callback.is_some())
            .finish()
    }
}

impl Broadcaster {
    /**
        Create a broadcaster for the given interface addresses
        (dotted-quad strings, as reported by the host's interface
        enumeration).
    */
    pub fn new(interface_addrs: &[String]) -> Result<Self> {
        let mut sockets = Vec::with_capacity(interface_addrs.len());
        for addr in interface_addrs {
            let ip: Ipv4Addr = addr
                .parse()
                .map_err(|_| DiscoveryError::InvalidAddress(addr.clone()))?;
            let socket = UdpSocket::bind(SocketAddrV4::new(ip, 0))?;
            socket.set_multicast_loop_v4(false)?;
            sockets.push(socket);
        }
        Ok(Self {
            sockets,
            error_callback: None,
        })
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    /// Allow (or suppress) receiving our own announcements on this host.
    pub fn enable_loopback(&self, enabled: bool) {
        for socket in &self.sockets {
            if let Err(e) = socket.set_multicast_loop_v4(enabled) {
                report(&self.error_callback, &format!("multicast loopback: {e}"));
            }
        }
    }

    /**
        Send one announcement through every interface. Per-interface
        failures are reported and do not stop the remaining sends.
    */
    pub fn send(&self, message: &[u8]) {
        let target = SocketAddrV4::new(MULTICAST_GROUP, DISCOVERY_PORT);
        for socket in &self.sockets {
            if let Err(e) = socket.send_to(message, target) {
                report(
                    &self.error_callback,
                    &format!("broadcast send failed: {e}"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_on_loopback() {
        let broadcaster = Broadcaster::new(&["127.0.0.1".to_string()]).unwrap();
        broadcaster.enable_loopback(true);
        broadcaster.send(b"hello");
    }

    #[test]
    fn rejects_bad_interface_address() {
        let err = Broadcaster::new(&["not-an-ip".to_string()]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidAddress(_)));
    }

    #[test]
    fn no_interfaces_is_a_quiet_noop() {
        let broadcaster = Broadcaster::new(&[]).unwrap();
        broadcaster.send(b"nobody hears this");
    }
}

/*!
    LAN discovery plumbing: a UDP multicast broadcaster/listener pair for
    announcing and finding peers, and a minimal TCP client/server pair for
    the follow-up request/response exchange.

    The message schema is the application's business — everything here
    moves opaque byte strings. All four components report failures through
    an optional error callback as well as their `Result` returns, so
    fire-and-forget callers still see problems.

    # Conventions

    - Multicast group `239.255.255.247`, port `8080`
    - TCP requests are a single CRLF-terminated line; the terminator is
      stripped before the server callback runs
    - `stop()` on the threaded components returns within five seconds
*/

mod broadcaster;
mod client;
mod listener;
mod server;

pub use broadcaster::Broadcaster;
pub use client::Client;
pub use listener::Listener;
pub use server::Server;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Multicast group used for discovery announcements.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 247);
/// UDP port for announcements and the default service port.
pub const DISCOVERY_PORT: u16 = 8080;
/// Bound on connect, read and stop operations.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Error callback shared by every component.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/**
    Errors from the discovery components.
*/
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("operation timed out")]
    Timeout,
    #[error("component already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

pub(crate) fn report(callback: &Option<ErrorCallback>, message: &str) {
    tracing::warn!("{message}");
    if let Some(callback) = callback {
        callback(message);
    }
}

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use worldlink_transport::ConnectionId;

/// Readable session identifier, rendered as `Client-N`.
///
/// The number comes from a per-registry sequence and is never reused
/// while the registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client-{}", self.0)
    }
}

/// One live peer connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub conn: ConnectionId,
    /// `None` when the transport could not report a peer address.
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: Instant,
}

impl Session {
    /// How long this session has been connected.
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

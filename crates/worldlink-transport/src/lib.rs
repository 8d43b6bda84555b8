//! Transport layer for worldlink.
//!
//! Provides the [`Transport`] and [`Connection`] traits over persistent,
//! bidirectional text-frame sockets, plus a WebSocket implementation for
//! both roles: [`WebSocketTransport`] accepts inbound peers (listener
//! role) and [`ClientConnection::connect`] dials a remote hub
//! (connector role).
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientConnection, PendingUpgrade, ServerConnection, WebSocketConnection, WebSocketTransport,
};

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// WebSocket close status codes used by the link.
pub mod close_code {
    /// Intentional, local close. The connector never reconnects after it.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (listener shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Peer closed without sending a status.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
}

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The close frame a peer sent before hanging up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Status code (see [`close_code`]).
    pub code: u16,
    /// Free-form reason text, possibly empty.
    pub reason: String,
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// A socket that was accepted but has not finished its handshake.
    type Incoming: Handshake<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming socket.
    ///
    /// Only the raw accept happens here. The protocol handshake is left
    /// to [`Handshake::complete`] so a slow peer cannot hold up the
    /// accept loop.
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;

    /// The address the transport is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// An accepted socket awaiting its protocol handshake.
pub trait Handshake: Send + 'static {
    /// The connection produced once the handshake succeeds.
    type Connection: Connection;
    /// The error type for a failed or timed-out handshake.
    type Error: std::error::Error + Send + Sync;

    /// Remote socket address of the pending peer.
    fn remote_addr(&self) -> SocketAddr;

    /// Runs the handshake, giving up after `timeout`.
    async fn complete(self, timeout: Duration) -> Result<Self::Connection, Self::Error>;
}

/// A single connection exchanging UTF-8 text frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    async fn send(&self, frame: &str) -> Result<(), Self::Error>;

    /// Receives the next text frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is closed. The close frame,
    /// if the peer sent one, is then available from
    /// [`close_info`](Self::close_info).
    async fn recv(&self) -> Result<Option<String>, Self::Error>;

    /// Sends a protocol-level keepalive.
    async fn ping(&self) -> Result<(), Self::Error>;

    /// Closes the connection with a status code and reason.
    async fn close(&self, code: u16, reason: &str) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Remote socket address, when known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Time since anything (data, ping, pong) was last received.
    fn idle_for(&self) -> Duration;

    /// The close frame received from the peer, if any.
    fn close_info(&self) -> Option<CloseInfo>;
}

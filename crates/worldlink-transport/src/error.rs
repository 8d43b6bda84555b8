use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Errors raised by the link layer.
///
/// Accept, send and receive failures end a single connection only; a
/// failed bind is fatal for the listener.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A TCP accept or the WebSocket upgrade after it failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// The peer opened a socket but did not finish the upgrade in time.
    #[error("handshake with {addr} timed out after {after:?}")]
    HandshakeTimeout { addr: SocketAddr, after: Duration },

    /// Dialing a remote endpoint failed (DNS, TCP or handshake).
    #[error("connect to {url} failed: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// The peer is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

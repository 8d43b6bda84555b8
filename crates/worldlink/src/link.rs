//! Per-connection outbound queue shared by both link roles.
//!
//! Every write to a socket goes through one writer task fed by an
//! unbounded channel, so frames reach a peer in the order they were
//! queued and no reader ever waits on a slow writer.

use std::sync::Arc;

use tokio::sync::mpsc;
use worldlink_protocol::{Codec, OutboundMessage};
use worldlink_transport::Connection;

/// One item for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outgoing {
    Frame(String),
    Ping,
    /// Send a close frame and stop writing.
    Close { code: u16, reason: String },
}

pub(crate) type OutgoingTx = mpsc::UnboundedSender<Outgoing>;

/// Encodes `message` and queues it. Returns `false` if nothing was queued.
pub(crate) fn queue_message<C: Codec>(codec: &C, tx: &OutgoingTx, message: &OutboundMessage) -> bool {
    match codec.encode(message) {
        Ok(frame) => tx.send(Outgoing::Frame(frame)).is_ok(),
        Err(e) => {
            tracing::error!(kind = message.tag(), error = %e, "failed to encode message");
            false
        }
    }
}

/// Drains `rx` into `conn` until the channel closes, a close is
/// written, or a write fails.
pub(crate) async fn run_writer<T: Connection>(conn: Arc<T>, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(out) = rx.recv().await {
        let (result, last) = match out {
            Outgoing::Frame(frame) => (conn.send(&frame).await, false),
            Outgoing::Ping => (conn.ping().await, false),
            Outgoing::Close { code, reason } => {
                tracing::debug!(id = %conn.id(), code, %reason, "closing connection");
                (conn.close(code, &reason).await, true)
            }
        };
        if let Err(e) = result {
            tracing::debug!(id = %conn.id(), error = %e, "write failed");
            break;
        }
        if last {
            break;
        }
    }
}

//! Error types for the protocol layer.
//!
//! The `Display` text of the parse errors is exactly what a peer sees in
//! the `message` field of the `error` reply, so keep it stable.

use crate::MessageKind;

/// Errors that can occur while parsing or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame looked like a JSON object but did not parse.
    #[error("Invalid JSON format")]
    InvalidJson(#[source] serde_json::Error),

    /// The `type` tag is not in the routing table.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// The tag was known but the fields did not match its shape.
    #[error("Invalid {kind} message: {source}")]
    InvalidFields {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing an outbound message failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Decoding a frame into a specific type failed.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

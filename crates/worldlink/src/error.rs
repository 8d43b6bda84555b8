//! Unified error type for worldlink.

use std::path::PathBuf;

use worldlink_command::CommandError;
use worldlink_host::HostError;
use worldlink_protocol::ProtocolError;
use worldlink_transport::TransportError;

/// Errors raised while loading or checking configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but describes something that cannot run.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors returned by [`Connector`](crate::Connector) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// No open link to the hub; the frame was dropped.
    #[error("not connected")]
    NotConnected,

    /// The connector driver has shut down.
    #[error("connector stopped")]
    Stopped,

    /// An outbound message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WorldlinkError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (parse, encode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The host update loop refused or dropped a request.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A plain-text instruction was refused.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The global tracing subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

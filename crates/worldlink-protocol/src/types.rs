//! Message types for the worldlink wire format.
//!
//! Inbound frames form a closed union keyed by a lower-cased `type` tag
//! (see [`MessageKind`]); anything that is not shaped like a JSON object
//! is a legacy plain-text instruction. Outbound messages are internally
//! tagged JSON objects with camelCase fields, e.g.
//! `{"type":"pong","timestamp":1700000000000,"clientTimestamp":1000}`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Footprint used when a `create_trading_floor` request omits `size`.
pub const DEFAULT_STRUCTURE_SIZE: i64 = 10;

/// World used when a `create_trading_floor` request omits `world`.
pub const DEFAULT_WORLD: &str = "world";

/// Milliseconds since the Unix epoch, as carried in `timestamp` fields.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// MessageKind: the routing table keys
// ---------------------------------------------------------------------------

/// The structured message kinds a peer may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `create_trading_floor`
    CreateTradingFloor,
    /// `ping`
    Ping,
    /// `broadcast`
    Broadcast,
    /// `get_server_info`
    GetServerInfo,
}

impl MessageKind {
    /// Every routable kind.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::CreateTradingFloor,
        MessageKind::Ping,
        MessageKind::Broadcast,
        MessageKind::GetServerInfo,
    ];

    /// The wire tag for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            Self::CreateTradingFloor => "create_trading_floor",
            Self::Ping => "ping",
            Self::Broadcast => "broadcast",
            Self::GetServerInfo => "get_server_info",
        }
    }

    /// Looks up a tag case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

fn default_size() -> i64 {
    DEFAULT_STRUCTURE_SIZE
}

fn default_world() -> String {
    DEFAULT_WORLD.to_string()
}

/// Fields of a `create_trading_floor` request.
///
/// `size` is kept wide here; range checking belongs to the structure
/// builder so that out-of-range values produce the domain error rather
/// than a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStructureRequest {
    /// Edge length of the square footprint.
    #[serde(default = "default_size")]
    pub size: i64,
    /// Host world to build in.
    #[serde(default = "default_world")]
    pub world: String,
    /// Center column; the world spawn is used when absent.
    #[serde(default)]
    pub center_x: Option<i32>,
    /// Center row; the world spawn is used when absent.
    #[serde(default)]
    pub center_z: Option<i32>,
    /// Clear the volume above the footprint before building.
    #[serde(default)]
    pub clear: bool,
}

impl Default for CreateStructureRequest {
    fn default() -> Self {
        Self {
            size: DEFAULT_STRUCTURE_SIZE,
            world: default_world(),
            center_x: None,
            center_z: None,
            clear: false,
        }
    }
}

/// A parsed inbound frame. Exactly one variant per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Build a structure in the host world.
    CreateStructure(CreateStructureRequest),
    /// Liveness probe; `timestamp` is echoed back as `clientTimestamp`.
    Ping { timestamp: Option<i64> },
    /// Relay `message` to every connected peer.
    Broadcast { message: String },
    /// Ask for a snapshot of host and link state.
    ServerInfoRequest,
    /// Legacy frame that is not a JSON object.
    PlainText { raw: String },
}

impl InboundMessage {
    /// The routing kind, or `None` for plain text.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Self::CreateStructure(_) => Some(MessageKind::CreateTradingFloor),
            Self::Ping { .. } => Some(MessageKind::Ping),
            Self::Broadcast { .. } => Some(MessageKind::Broadcast),
            Self::ServerInfoRequest => Some(MessageKind::GetServerInfo),
            Self::PlainText { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages the link sends to peers.
///
/// Tags and field names follow the established wire format so existing
/// dashboards and bots keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Sent once to a peer right after it connects.
    #[serde(rename = "welcome")]
    Welcome {
        session_id: String,
        message: String,
        server: String,
    },

    /// Ack to the peer that requested a structure.
    #[serde(rename = "trading_floor_created")]
    StructureCreated {
        success: bool,
        center_x: i32,
        center_y: i32,
        center_z: i32,
        size: u32,
        world: String,
        requested_by: String,
    },

    /// Fan-out of a structure creation to every other peer.
    #[serde(rename = "trading_floor_created_broadcast")]
    StructureCreatedBroadcast {
        center_x: i32,
        center_y: i32,
        center_z: i32,
        size: u32,
        world: String,
        created_by: String,
    },

    /// Reply to `ping`.
    #[serde(rename = "pong")]
    Pong {
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_timestamp: Option<i64>,
    },

    /// Reply to `get_server_info`.
    #[serde(rename = "server_info")]
    ServerInfo {
        server_name: String,
        version: String,
        online_players: u32,
        max_players: u32,
        connected_clients: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },

    /// A peer's `broadcast`, relayed to everyone.
    #[serde(rename = "broadcast_message")]
    BroadcastRelay {
        message: String,
        from: String,
        timestamp: i64,
    },

    /// Another peer connected.
    #[serde(rename = "client_connected")]
    PeerJoined { client_id: String },

    /// Another peer disconnected.
    #[serde(rename = "client_disconnected")]
    PeerLeft { client_id: String },

    /// Any failure to honour a frame.
    #[serde(rename = "error")]
    Error { message: String, timestamp: i64 },

    /// Listener reply to a plain-text frame.
    #[serde(rename = "echo")]
    Echo {
        original_message: String,
        from: String,
    },

    /// Sent to every peer before the listener closes.
    #[serde(rename = "server_shutdown")]
    ServerShutdown { message: String },

    /// Connector reply to a plain-text instruction.
    #[serde(rename = "command_result")]
    CommandResult {
        command: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl OutboundMessage {
    /// An `error` reply stamped with the current time.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    /// A `pong` stamped with the current time.
    pub fn pong(client_timestamp: Option<i64>) -> Self {
        Self::Pong {
            timestamp: now_millis(),
            client_timestamp,
        }
    }

    /// The wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::StructureCreated { .. } => "trading_floor_created",
            Self::StructureCreatedBroadcast { .. } => {
                "trading_floor_created_broadcast"
            }
            Self::Pong { .. } => "pong",
            Self::ServerInfo { .. } => "server_info",
            Self::BroadcastRelay { .. } => "broadcast_message",
            Self::PeerJoined { .. } => "client_connected",
            Self::PeerLeft { .. } => "client_disconnected",
            Self::Error { .. } => "error",
            Self::Echo { .. } => "echo",
            Self::ServerShutdown { .. } => "server_shutdown",
            Self::CommandResult { .. } => "command_result",
        }
    }
}

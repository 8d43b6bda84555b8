//! Protocol dispatcher shared by both link roles.
//!
//! A frame goes in, exactly one reply comes out, plus an optional
//! message for the other peers. The dispatcher never touches sockets;
//! the listener and connector decide where replies and fan-outs go.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use worldlink_command::CommandExecutor;
use worldlink_host::{HostError, HostHandle, StructureRequest};
use worldlink_protocol::{
    CreateStructureRequest, InboundMessage, OutboundMessage, now_millis, parse_frame,
};

use crate::config::Role;

/// Where a frame came from and what the link looks like right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    /// Display name of the sender (`Client-3`, or `hub` for a connector).
    pub from: String,
    pub connected_peers: usize,
    /// Listening port, reported in `server_info`.
    pub port: Option<u16>,
}

/// The outcome of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Sent to the originating peer only.
    pub reply: OutboundMessage,
    /// Sent to every other peer, when present.
    pub fan_out: Option<OutboundMessage>,
}

impl Dispatch {
    pub fn reply(reply: OutboundMessage) -> Self {
        Self {
            reply,
            fan_out: None,
        }
    }
}

/// Routes parsed frames to the host and the command executor.
pub struct Dispatcher {
    role: Role,
    host: HostHandle,
    executor: CommandExecutor,
}

impl Dispatcher {
    pub fn new(role: Role, host: HostHandle, executor: CommandExecutor) -> Self {
        Self {
            role,
            host,
            executor,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Handles one inbound text frame.
    ///
    /// Never fails: protocol, domain and internal errors (including a
    /// panicking handler) all become an `error` reply.
    pub async fn dispatch(&self, frame: &str, ctx: &DispatchContext) -> Dispatch {
        match AssertUnwindSafe(self.route(frame, ctx)).catch_unwind().await {
            Ok(dispatch) => dispatch,
            Err(_) => {
                tracing::error!(from = %ctx.from, "handler panicked");
                Dispatch::reply(OutboundMessage::error("Internal error"))
            }
        }
    }

    async fn route(&self, frame: &str, ctx: &DispatchContext) -> Dispatch {
        let message = match parse_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(from = %ctx.from, error = %e, "rejected frame");
                return Dispatch::reply(OutboundMessage::error(e.to_string()));
            }
        };
        tracing::trace!(from = %ctx.from, kind = ?message.kind(), "dispatching");

        match message {
            InboundMessage::CreateStructure(req) => self.create_structure(req, ctx).await,
            InboundMessage::Ping { timestamp } => {
                Dispatch::reply(OutboundMessage::pong(timestamp))
            }
            InboundMessage::Broadcast { message } => self.broadcast(message, ctx).await,
            InboundMessage::ServerInfoRequest => self.server_info(ctx).await,
            InboundMessage::PlainText { raw } => self.plain_text(raw, ctx).await,
        }
    }

    async fn create_structure(&self, req: CreateStructureRequest, ctx: &DispatchContext) -> Dispatch {
        let world = req.world;
        let request = StructureRequest {
            world: world.clone(),
            size: req.size,
            center: req.center_x.zip(req.center_z),
            clear: req.clear,
        };
        match self.host.build_structure(request).await {
            Ok(report) => {
                tracing::info!(
                    from = %ctx.from,
                    %world,
                    size = report.size,
                    center_x = report.center_x,
                    center_z = report.center_z,
                    "structure created"
                );
                Dispatch {
                    reply: OutboundMessage::StructureCreated {
                        success: true,
                        center_x: report.center_x,
                        center_y: report.center_y,
                        center_z: report.center_z,
                        size: report.size,
                        world: world.clone(),
                        requested_by: ctx.from.clone(),
                    },
                    fan_out: Some(OutboundMessage::StructureCreatedBroadcast {
                        center_x: report.center_x,
                        center_y: report.center_y,
                        center_z: report.center_z,
                        size: report.size,
                        world,
                        created_by: ctx.from.clone(),
                    }),
                }
            }
            Err(HostError::Unavailable) => {
                tracing::error!(from = %ctx.from, "host unavailable for structure build");
                Dispatch::reply(OutboundMessage::error(
                    "Failed to create trading floor: host unavailable",
                ))
            }
            Err(e) => {
                tracing::info!(from = %ctx.from, error = %e, "structure request refused");
                Dispatch::reply(OutboundMessage::error(e.to_string()))
            }
        }
    }

    async fn broadcast(&self, message: String, ctx: &DispatchContext) -> Dispatch {
        if message.trim().is_empty() {
            return Dispatch::reply(OutboundMessage::error("Broadcast message is required"));
        }
        if self.role == Role::Listener {
            let line = format!("[{}] {}", ctx.from, message);
            if let Err(e) = self.executor.announce(&line).await {
                tracing::debug!(error = %e, "broadcast not shown in world");
            }
        }
        let relay = OutboundMessage::BroadcastRelay {
            message,
            from: ctx.from.clone(),
            timestamp: now_millis(),
        };
        Dispatch {
            reply: relay.clone(),
            fan_out: Some(relay),
        }
    }

    async fn server_info(&self, ctx: &DispatchContext) -> Dispatch {
        match self.host.info().await {
            Ok(info) => Dispatch::reply(OutboundMessage::ServerInfo {
                server_name: info.name,
                version: info.version,
                online_players: info.online_players,
                max_players: info.max_players,
                connected_clients: ctx.connected_peers,
                port: ctx.port,
            }),
            Err(e) => Dispatch::reply(OutboundMessage::error(format!(
                "Server info unavailable: {e}"
            ))),
        }
    }

    async fn plain_text(&self, raw: String, ctx: &DispatchContext) -> Dispatch {
        match self.role {
            Role::Listener => Dispatch::reply(OutboundMessage::Echo {
                original_message: raw,
                from: ctx.from.clone(),
            }),
            Role::Connector => match self.executor.execute(&raw).await {
                Ok(done) => Dispatch::reply(OutboundMessage::CommandResult {
                    command: done.command,
                    success: true,
                    message: None,
                }),
                Err(e) => Dispatch::reply(OutboundMessage::CommandResult {
                    command: raw.trim().to_string(),
                    success: false,
                    message: Some(e.to_string()),
                }),
            },
        }
    }
}

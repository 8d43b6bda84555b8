//! Listener link: accepts many peers and serves them from one dispatcher.
//!
//! Each accepted socket gets its own task that finishes the WebSocket
//! upgrade (bounded by the idle timeout) and then reads frames in
//! order, plus a writer task fed through the session registry. Replies
//! go to the origin only; fan-outs go to every other open session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use worldlink_protocol::{Codec, JsonCodec, OutboundMessage};
use worldlink_session::{Session, SessionRegistry};
use worldlink_transport::{
    Connection, ConnectionId, Handshake, PendingUpgrade, Transport, WebSocketTransport,
    close_code,
};

use crate::config::ListenerConfig;
use crate::dispatcher::{DispatchContext, Dispatcher};
use crate::link::{Outgoing, OutgoingTx, queue_message, run_writer};
use crate::WorldlinkError;

const WELCOME_MESSAGE: &str = "Connected to worldlink";

/// How long shutdown waits for peers to acknowledge the close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const MIN_KEEPALIVE: Duration = Duration::from_millis(10);

/// Lifecycle of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Shared<C> {
    registry: SessionRegistry<OutgoingTx>,
    dispatcher: Arc<Dispatcher>,
    codec: C,
    idle_timeout: Duration,
    server_name: String,
    port: u16,
}

impl<C: Codec> Shared<C> {
    fn send_to(&self, tx: &OutgoingTx, message: &OutboundMessage) {
        queue_message(&self.codec, tx, message);
    }

    /// Queues `message` for every open session except `except`.
    fn broadcast(&self, message: &OutboundMessage, except: Option<ConnectionId>) -> usize {
        let frame = match self.codec.encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(kind = message.tag(), error = %e, "failed to encode broadcast");
                return 0;
            }
        };
        let mut sent = 0;
        self.registry.for_each_open(|session, tx| {
            if Some(session.conn) != except && tx.send(Outgoing::Frame(frame.clone())).is_ok() {
                sent += 1;
            }
        });
        tracing::trace!(kind = message.tag(), sent, "broadcast queued");
        sent
    }
}

/// Builder for configuring and starting a [`Listener`].
///
/// # Example
///
/// ```rust,ignore
/// let listener = ListenerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .server_name("market")
///     .start(dispatcher)
///     .await?;
/// ```
pub struct ListenerBuilder<C = JsonCodec> {
    bind_addr: String,
    idle_timeout: Duration,
    server_name: String,
    codec: C,
}

impl ListenerBuilder<JsonCodec> {
    pub fn new() -> Self {
        Self::from_config(&ListenerConfig::default())
    }

    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr(),
            idle_timeout: config.idle_timeout(),
            server_name: config.server_name.clone(),
            codec: JsonCodec,
        }
    }
}

impl Default for ListenerBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ListenerBuilder<C> {
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Peers silent for longer than this are disconnected.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Replaces the codec used for outbound frames.
    pub fn codec<C2: Codec>(self, codec: C2) -> ListenerBuilder<C2> {
        ListenerBuilder {
            bind_addr: self.bind_addr,
            idle_timeout: self.idle_timeout,
            server_name: self.server_name,
            codec,
        }
    }

    /// Binds the socket and starts accepting peers.
    pub async fn start(self, dispatcher: Arc<Dispatcher>) -> Result<Listener<C>, WorldlinkError> {
        let (state, _) = watch::channel(ListenerState::Starting);
        tracing::debug!(addr = %self.bind_addr, "listener starting");

        let transport = match WebSocketTransport::bind(&self.bind_addr).await {
            Ok(transport) => transport,
            Err(e) => {
                state.send_replace(ListenerState::Stopped);
                tracing::error!(addr = %self.bind_addr, error = %e, "listener failed to bind");
                return Err(e.into());
            }
        };
        let local_addr = transport.local_addr();

        let shared = Arc::new(Shared {
            registry: SessionRegistry::new(),
            dispatcher,
            codec: self.codec,
            idle_timeout: self.idle_timeout,
            server_name: self.server_name,
            port: local_addr.port(),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(transport, Arc::clone(&shared), shutdown_rx));

        state.send_replace(ListenerState::Running);
        tracing::info!(%local_addr, server = %shared.server_name, "listener running");

        Ok(Listener {
            shared,
            local_addr,
            shutdown,
            state,
            accept_task: Some(accept_task),
        })
    }
}

/// A running listener.
///
/// Call [`shutdown`](Self::shutdown) to notify peers and stop; dropping
/// the listener stops accepting without notifying anyone.
pub struct Listener<C: Codec = JsonCodec> {
    shared: Arc<Shared<C>>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    state: watch::Sender<ListenerState>,
    accept_task: Option<JoinHandle<()>>,
}

impl Listener<JsonCodec> {
    pub fn builder() -> ListenerBuilder<JsonCodec> {
        ListenerBuilder::new()
    }
}

impl<C: Codec> Listener<C> {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn session_count(&self) -> usize {
        self.shared.registry.count()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.shared.registry.sessions()
    }

    /// Sends `message` to every connected peer. Returns how many were reached.
    pub fn broadcast(&self, message: &OutboundMessage) -> usize {
        self.shared.broadcast(message, None)
    }

    /// Tells every peer the server is going away, closes their
    /// connections with status 1001 and stops accepting.
    ///
    /// Waits briefly for peers to acknowledge the close. Calling it
    /// again is a no-op.
    pub async fn shutdown(&mut self) {
        let Some(accept_task) = self.accept_task.take() else {
            return;
        };
        self.state.send_replace(ListenerState::Stopping);
        tracing::info!(sessions = self.shared.registry.count(), "listener shutting down");

        let _ = self.shutdown.send(true);
        self.shared.broadcast(
            &OutboundMessage::ServerShutdown {
                message: "Server is shutting down".to_string(),
            },
            None,
        );
        self.shared.registry.for_each_open(|_, tx| {
            let _ = tx.send(Outgoing::Close {
                code: close_code::GOING_AWAY,
                reason: "Server shutdown".to_string(),
            });
        });

        if let Err(e) = accept_task.await {
            tracing::warn!(error = %e, "accept loop ended abnormally");
        }
        self.state.send_replace(ListenerState::Stopped);
        tracing::info!("listener stopped");
    }
}

impl<C: Codec> Drop for Listener<C> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn accept_loop<C: Codec>(
    mut transport: WebSocketTransport,
    shared: Arc<Shared<C>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = transport.accept() => match accepted {
                Ok(pending) => {
                    sessions.spawn(handle_connection(pending, Arc::clone(&shared), shutdown.clone()));
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
        }
        while sessions.try_join_next().is_some() {}
    }
    drop(transport);

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(remaining = sessions.len(), "aborting sessions that did not close in time");
        sessions.shutdown().await;
    }
}

/// Unregisters a session when its task ends, however it ends.
struct SessionGuard<'a, C: Codec> {
    shared: &'a Shared<C>,
    conn: ConnectionId,
    shutdown: &'a watch::Receiver<bool>,
}

impl<C: Codec> Drop for SessionGuard<'_, C> {
    fn drop(&mut self) {
        let Some(session) = self.shared.registry.unregister(self.conn) else {
            return;
        };
        // Everyone is leaving during shutdown; spare them the noise.
        if !*self.shutdown.borrow() {
            self.shared.broadcast(
                &OutboundMessage::PeerLeft {
                    client_id: session.id.to_string(),
                },
                None,
            );
        }
    }
}

async fn handle_connection<C: Codec>(
    pending: PendingUpgrade,
    shared: Arc<Shared<C>>,
    shutdown: watch::Receiver<bool>,
) {
    let addr = pending.remote_addr();
    let conn = match pending.complete(shared.idle_timeout).await {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            tracing::debug!(%addr, error = %e, "handshake failed");
            return;
        }
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(run_writer(Arc::clone(&conn), rx));

    let session_id = shared
        .registry
        .register(conn.id(), conn.remote_addr(), tx.clone());
    let guard = SessionGuard {
        shared: &shared,
        conn: conn.id(),
        shutdown: &shutdown,
    };
    let from = session_id.to_string();

    shared.send_to(
        &tx,
        &OutboundMessage::Welcome {
            session_id: from.clone(),
            message: WELCOME_MESSAGE.to_string(),
            server: shared.server_name.clone(),
        },
    );
    shared.broadcast(
        &OutboundMessage::PeerJoined {
            client_id: from.clone(),
        },
        Some(conn.id()),
    );

    let mut keepalive = tokio::time::interval((shared.idle_timeout / 2).max(MIN_KEEPALIVE));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await;

    loop {
        tokio::select! {
            frame = conn.recv() => match frame {
                Ok(Some(text)) => {
                    let ctx = DispatchContext {
                        from: from.clone(),
                        connected_peers: shared.registry.count(),
                        port: Some(shared.port),
                    };
                    let dispatch = shared.dispatcher.dispatch(&text, &ctx).await;
                    shared.send_to(&tx, &dispatch.reply);
                    if let Some(fan_out) = dispatch.fan_out {
                        shared.broadcast(&fan_out, Some(conn.id()));
                    }
                }
                Ok(None) => {
                    let code = conn.close_info().map(|c| c.code);
                    tracing::debug!(session_id = %session_id, ?code, "peer closed");
                    break;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "read failed");
                    break;
                }
            },
            _ = keepalive.tick() => {
                if conn.idle_for() > shared.idle_timeout {
                    tracing::info!(session_id = %session_id, idle_ms = conn.idle_for().as_millis() as u64, "idle timeout");
                    let _ = tx.send(Outgoing::Close {
                        code: close_code::GOING_AWAY,
                        reason: "Idle timeout".to_string(),
                    });
                    break;
                }
                let _ = tx.send(Outgoing::Ping);
            }
        }
    }

    drop(guard);
    drop(tx);
    let _ = writer.await;
}

//! Connector link: one outbound connection to a hub, kept alive.
//!
//! A single driver task owns all link state. Public calls, connection
//! results, retry timers and reader exits all reach it as [`Event`]s,
//! so state changes are strictly sequential. Every connection attempt
//! gets a new generation number; events carrying an older generation
//! belong to a socket that has since been replaced and are ignored.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │ close (≠ 1000)
//!      │ gave up / 1000         ▼ fail             ▼
//!      └──────────────────── Reconnecting ◀────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use worldlink_protocol::{Codec, JsonCodec, OutboundMessage};
use worldlink_transport::{ClientConnection, Connection, TransportError, close_code};

use crate::ConnectorError;
use crate::config::ConnectorConfig;
use crate::dispatcher::{DispatchContext, Dispatcher};
use crate::link::{Outgoing, OutgoingTx, queue_message, run_writer};

/// Name the dispatcher sees as the origin of hub frames.
const HUB_ORIGIN: &str = "hub";

/// Link state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorStatus {
    pub state: ConnectorState,
    /// Consecutive failed attempts since the last successful connect.
    pub attempts: u32,
    /// Every connection attempt made since the connector started.
    pub total_attempts: u64,
    /// Retries were exhausted; only `force_reconnect` resumes.
    pub gave_up: bool,
}

/// Runtime settings, usually built from [`ConnectorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorOptions {
    pub url: String,
    pub auto_reconnect: bool,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub health_check: Duration,
}

impl From<&ConnectorConfig> for ConnectorOptions {
    fn from(config: &ConnectorConfig) -> Self {
        Self {
            url: config.server_url.clone(),
            auto_reconnect: config.auto_reconnect,
            max_attempts: config.max_reconnect_attempts,
            retry_delay: Duration::from_millis(config.reconnect_delay_ms),
            health_check: Duration::from_secs(config.health_check_secs.max(1)),
        }
    }
}

enum Event {
    Connect,
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    ForceReconnect,
    Send {
        frame: String,
        reply: oneshot::Sender<Result<(), ConnectorError>>,
    },
    Opened {
        generation: u64,
        conn: Arc<ClientConnection>,
    },
    ConnectFailed {
        generation: u64,
        error: TransportError,
    },
    Closed {
        generation: u64,
        code: u16,
    },
    RetryDue {
        generation: u64,
    },
    Shutdown,
}

/// Handle to a running connector. Dropping it stops the driver.
pub struct Connector<C: Codec = JsonCodec> {
    events: mpsc::UnboundedSender<Event>,
    status: watch::Receiver<ConnectorStatus>,
    codec: C,
    driver: Option<JoinHandle<()>>,
}

impl Connector<JsonCodec> {
    /// Starts the driver.
    ///
    /// The first dial happens on [`connect`](Self::connect), or on the
    /// first health check when `auto_reconnect` is set, whichever comes
    /// first.
    pub fn spawn(options: ConnectorOptions, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_codec(options, dispatcher, JsonCodec)
    }
}

impl<C: Codec + Clone> Connector<C> {
    pub fn with_codec(options: ConnectorOptions, dispatcher: Arc<Dispatcher>, codec: C) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let initial = ConnectorStatus {
            state: ConnectorState::Disconnected,
            attempts: 0,
            total_attempts: 0,
            gave_up: false,
        };
        let (status_tx, status) = watch::channel(initial);

        let driver = Driver {
            options,
            dispatcher,
            codec: codec.clone(),
            events: events.clone(),
            status: status_tx,
            state: ConnectorState::Disconnected,
            attempts: 0,
            total_attempts: 0,
            gave_up: false,
            terminal: false,
            generation: 0,
            link: None,
        };
        let driver = tokio::spawn(driver.run(rx));

        Self {
            events,
            status,
            codec,
            driver: Some(driver),
        }
    }
}

impl<C: Codec> Connector<C> {
    /// Starts a connection attempt unless one is open or in flight.
    pub fn connect(&self) {
        let _ = self.events.send(Event::Connect);
    }

    /// Closes the link with status 1000. The connector stays
    /// disconnected until `connect` or `force_reconnect`.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::Disconnect { reply })
            .map_err(|_| ConnectorError::Stopped)?;
        rx.await.map_err(|_| ConnectorError::Stopped)
    }

    /// Drops the current socket, resets the retry budget and dials again.
    pub fn force_reconnect(&self) {
        let _ = self.events.send(Event::ForceReconnect);
    }

    /// Sends one text frame to the hub.
    ///
    /// Fails with [`ConnectorError::NotConnected`] when the link is down;
    /// nothing is buffered for later.
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), ConnectorError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::Send {
                frame: frame.into(),
                reply,
            })
            .map_err(|_| ConnectorError::Stopped)?;
        rx.await.map_err(|_| ConnectorError::Stopped)?
    }

    /// Encodes and sends `message` to the hub.
    pub async fn send_message(&self, message: &OutboundMessage) -> Result<(), ConnectorError> {
        let frame = self
            .codec
            .encode(message)
            .map_err(|e| ConnectorError::Encode(e.to_string()))?;
        self.send(frame).await
    }

    pub fn status(&self) -> ConnectorStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().state == ConnectorState::Connected
    }

    /// A receiver that observes every published status.
    pub fn subscribe(&self) -> watch::Receiver<ConnectorStatus> {
        self.status.clone()
    }

    /// Waits until `predicate` holds for the published status.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ConnectorStatus) -> bool,
    ) -> Result<ConnectorStatus, ConnectorError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(predicate)
            .await
            .map_err(|_| ConnectorError::Stopped)?;
        Ok(status.clone())
    }

    /// Disconnects and stops the driver.
    pub async fn shutdown(&mut self) {
        let _ = self.disconnect().await;
        let _ = self.events.send(Event::Shutdown);
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "connector driver ended abnormally");
            }
        }
    }
}

impl<C: Codec> Drop for Connector<C> {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
    }
}

struct ActiveLink {
    conn: Arc<ClientConnection>,
    outgoing: OutgoingTx,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ActiveLink {
    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

struct Driver<C> {
    options: ConnectorOptions,
    dispatcher: Arc<Dispatcher>,
    codec: C,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<ConnectorStatus>,
    state: ConnectorState,
    attempts: u32,
    total_attempts: u64,
    gave_up: bool,
    /// Set by a manual disconnect, a normal close or exhausted retries.
    terminal: bool,
    generation: u64,
    link: Option<ActiveLink>,
}

impl<C: Codec + Clone> Driver<C> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        let mut health = tokio::time::interval(self.options.health_check);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        health.tick().await;

        tracing::info!(url = %self.options.url, max_attempts = self.options.max_attempts, "connector started");
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(Event::Shutdown) | None => break,
                    Some(event) => self.handle(event),
                },
                _ = health.tick() => self.health_check(),
            }
            self.publish();
        }

        if let Some(link) = self.link.take() {
            link.abort();
        }
        self.state = ConnectorState::Disconnected;
        self.publish();
        tracing::info!("connector stopped");
    }

    fn publish(&self) {
        let status = ConnectorStatus {
            state: self.state,
            attempts: self.attempts,
            total_attempts: self.total_attempts,
            gave_up: self.gave_up,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Connect => {
                if matches!(self.state, ConnectorState::Disconnected | ConnectorState::Reconnecting) {
                    self.terminal = false;
                    self.start_attempt();
                }
            }
            Event::Disconnect { reply } => {
                self.disconnect();
                self.publish();
                let _ = reply.send(());
            }
            Event::ForceReconnect => {
                tracing::info!("forcing reconnect");
                self.generation += 1;
                if let Some(link) = self.link.take() {
                    link.abort();
                }
                self.attempts = 0;
                self.gave_up = false;
                self.terminal = false;
                self.start_attempt();
            }
            Event::Send { frame, reply } => {
                let _ = reply.send(self.send(frame));
            }
            Event::Opened { generation, conn } => self.on_opened(generation, conn),
            Event::ConnectFailed { generation, error } => {
                if generation == self.generation {
                    self.on_connect_failed(error);
                }
            }
            Event::Closed { generation, code } => {
                if generation == self.generation && self.link.is_some() {
                    self.on_closed(code);
                }
            }
            Event::RetryDue { generation } => {
                if generation == self.generation && self.state == ConnectorState::Reconnecting {
                    self.start_attempt();
                }
            }
            Event::Shutdown => {}
        }
    }

    fn start_attempt(&mut self) {
        self.generation += 1;
        self.total_attempts += 1;
        self.state = ConnectorState::Connecting;
        let generation = self.generation;
        tracing::info!(
            url = %self.options.url,
            attempt = self.attempts + 1,
            max_attempts = self.options.max_attempts,
            "connecting"
        );

        let url = self.options.url.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match ClientConnection::connect(&url).await {
                Ok(conn) => Event::Opened {
                    generation,
                    conn: Arc::new(conn),
                },
                Err(error) => Event::ConnectFailed { generation, error },
            };
            let _ = events.send(event);
        });
    }

    fn on_opened(&mut self, generation: u64, conn: Arc<ClientConnection>) {
        if generation != self.generation || self.state != ConnectorState::Connecting {
            // A newer attempt or a disconnect superseded this one.
            tokio::spawn(async move {
                let _ = conn.close(close_code::NORMAL, "superseded").await;
            });
            return;
        }

        let (outgoing, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(Arc::clone(&conn), rx));
        let reader = tokio::spawn(read_loop(
            Arc::clone(&conn),
            generation,
            Arc::clone(&self.dispatcher),
            self.codec.clone(),
            outgoing.clone(),
            self.events.clone(),
        ));

        self.link = Some(ActiveLink {
            conn,
            outgoing,
            reader,
            writer,
        });
        self.state = ConnectorState::Connected;
        self.attempts = 0;
        self.gave_up = false;
        tracing::info!(url = %self.options.url, "connected");
    }

    fn on_connect_failed(&mut self, error: TransportError) {
        self.attempts += 1;
        tracing::warn!(
            attempt = self.attempts,
            max_attempts = self.options.max_attempts,
            error = %error,
            "connection attempt failed"
        );
        if !self.options.auto_reconnect {
            self.state = ConnectorState::Disconnected;
        } else if self.attempts >= self.options.max_attempts {
            self.give_up();
        } else {
            self.schedule_retry();
        }
    }

    fn on_closed(&mut self, code: u16) {
        if let Some(link) = self.link.take() {
            link.abort();
        }
        tracing::info!(code, "connection closed");

        if code == close_code::NORMAL {
            self.state = ConnectorState::Disconnected;
            self.terminal = true;
        } else if !self.options.auto_reconnect {
            self.state = ConnectorState::Disconnected;
        } else if self.attempts >= self.options.max_attempts {
            self.give_up();
        } else {
            self.schedule_retry();
        }
    }

    fn give_up(&mut self) {
        tracing::error!(
            attempts = self.attempts,
            url = %self.options.url,
            "giving up after repeated connection failures"
        );
        self.state = ConnectorState::Disconnected;
        self.gave_up = true;
        self.terminal = true;
    }

    fn schedule_retry(&mut self) {
        self.state = ConnectorState::Reconnecting;
        let generation = self.generation;
        let delay = self.options.retry_delay;
        let events = self.events.clone();
        tracing::info!(delay_ms = delay.as_millis() as u64, attempt = self.attempts + 1, "reconnect scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::RetryDue { generation });
        });
    }

    fn disconnect(&mut self) {
        self.generation += 1;
        self.terminal = true;
        self.state = ConnectorState::Disconnected;
        if let Some(link) = self.link.take() {
            tracing::info!("disconnecting");
            let _ = link.outgoing.send(Outgoing::Close {
                code: close_code::NORMAL,
                reason: "Client disconnecting".to_string(),
            });
            // The writer delivers the close frame, then exits on its own.
            link.reader.abort();
        }
    }

    fn send(&self, frame: String) -> Result<(), ConnectorError> {
        match &self.link {
            Some(link) if self.state == ConnectorState::Connected => link
                .outgoing
                .send(Outgoing::Frame(frame))
                .map_err(|_| ConnectorError::NotConnected),
            _ => {
                tracing::warn!(state = ?self.state, "cannot send, not connected");
                Err(ConnectorError::NotConnected)
            }
        }
    }

    fn health_check(&mut self) {
        if let Some(link) = &self.link {
            // The reader reports every close it sees; a finished reader
            // with the link still installed means it died (a panicking
            // codec, say) before it could.
            if link.reader.is_finished() {
                let code = link
                    .conn
                    .close_info()
                    .map_or(close_code::ABNORMAL, |info| info.code);
                tracing::warn!(code, "reader stopped without reporting a close");
                self.on_closed(code);
            }
            return;
        }
        if self.options.auto_reconnect && !self.terminal && self.state == ConnectorState::Disconnected {
            tracing::info!("health check found link down, reconnecting");
            self.start_attempt();
        }
    }
}

/// Feeds hub frames through the dispatcher, in order, until the link ends.
async fn read_loop<C: Codec>(
    conn: Arc<ClientConnection>,
    generation: u64,
    dispatcher: Arc<Dispatcher>,
    codec: C,
    outgoing: OutgoingTx,
    events: mpsc::UnboundedSender<Event>,
) {
    let ctx = DispatchContext {
        from: HUB_ORIGIN.to_string(),
        connected_peers: 1,
        port: None,
    };
    let code = loop {
        match conn.recv().await {
            Ok(Some(frame)) => {
                let dispatch = dispatcher.dispatch(&frame, &ctx).await;
                queue_message(&codec, &outgoing, &dispatch.reply);
            }
            Ok(None) => {
                break conn
                    .close_info()
                    .map_or(close_code::ABNORMAL, |info| info.code);
            }
            Err(e) => {
                tracing::debug!(error = %e, "hub read failed");
                break close_code::ABNORMAL;
            }
        }
    };
    let _ = events.send(Event::Closed { generation, code });
}

//! End-to-end tests for the connector link.
//!
//! A scripted hub built directly on `tokio-tungstenite` plays the remote
//! side; the connector runs against a live `host-update` thread.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};
use worldlink::config::Role;
use worldlink::{Connector, ConnectorError, ConnectorOptions, ConnectorState, ConnectorStatus, Dispatcher};
use worldlink_command::{CommandExecutor, CommandPolicy};
use worldlink_host::{HostConfig, HostHandle, HostLoop, HostThread, MemoryWorld, WorldProbe};
use worldlink_protocol::{Codec, ProtocolError};

type HubConn = WebSocketStream<TcpStream>;

// =========================================================================
// Helpers
// =========================================================================

/// Accepts WebSocket connections and hands them to the test.
struct Hub {
    addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<HubConn>,
}

impl Hub {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = accept_async(stream).await {
                        let _ = tx.send(ws);
                    }
                });
            }
        });
        Self { addr, conns }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn next_conn(&mut self) -> HubConn {
        timeout(Duration::from_secs(5), self.conns.recv())
            .await
            .expect("timed out waiting for the connector")
            .expect("hub stopped")
    }

    async fn expect_no_conn(&mut self, within: Duration) {
        assert!(
            timeout(within, self.conns.recv()).await.is_err(),
            "connector dialed again"
        );
    }
}

struct Fixture {
    connector: Connector,
    host: HostHandle,
    thread: HostThread,
    probe: WorldProbe,
}

impl Fixture {
    fn new(options: ConnectorOptions) -> Self {
        let world = MemoryWorld::new();
        let probe = world.probe();
        let (host, thread) = HostLoop::spawn(
            world,
            HostConfig {
                tick_rate_hz: 200,
                ..HostConfig::default()
            },
        )
        .unwrap();
        let executor = CommandExecutor::new(Arc::new(CommandPolicy::default()), host.clone());
        let dispatcher = Arc::new(Dispatcher::new(Role::Connector, host.clone(), executor));
        Self {
            connector: Connector::spawn(options, dispatcher),
            host,
            thread,
            probe,
        }
    }

    async fn wait_for(&self, predicate: impl FnMut(&ConnectorStatus) -> bool) -> ConnectorStatus {
        timeout(Duration::from_secs(10), self.connector.wait_for(predicate))
            .await
            .expect("timed out waiting for connector status")
            .unwrap()
    }

    async fn stop(mut self) {
        self.connector.shutdown().await;
        let _ = self.host.shutdown().await;
        tokio::task::spawn_blocking(move || self.thread.join())
            .await
            .unwrap()
            .unwrap();
    }
}

fn options(url: String) -> ConnectorOptions {
    ConnectorOptions {
        url,
        auto_reconnect: true,
        max_attempts: 5,
        retry_delay: Duration::from_millis(20),
        health_check: Duration::from_secs(60),
    }
}

/// A URL nothing listens on.
async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

async fn next_json(ws: &mut HubConn) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => continue,
        }
    }
}

// =========================================================================
// Retry budget
// =========================================================================

#[tokio::test]
async fn test_gives_up_after_exactly_max_attempts() {
    let f = Fixture::new(options(unreachable_url().await));
    f.connector.connect();

    let status = f.wait_for(|s| s.gave_up).await;
    assert_eq!(status.state, ConnectorState::Disconnected);
    assert_eq!(status.attempts, 5);
    assert_eq!(status.total_attempts, 5);

    // Terminal: no further attempts.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.connector.status().total_attempts, 5);
    assert_eq!(f.connector.send("hello").await, Err(ConnectorError::NotConnected));

    f.stop().await;
}

#[tokio::test]
async fn test_force_reconnect_resets_the_budget() {
    let f = Fixture::new(options(unreachable_url().await));
    f.connector.connect();
    f.wait_for(|s| s.gave_up).await;

    f.connector.force_reconnect();
    let status = f.wait_for(|s| s.gave_up && s.total_attempts == 10).await;
    assert_eq!(status.attempts, 5);

    f.stop().await;
}

#[tokio::test]
async fn test_without_auto_reconnect_one_failure_is_final() {
    let f = Fixture::new(ConnectorOptions {
        auto_reconnect: false,
        ..options(unreachable_url().await)
    });
    f.connector.connect();

    let status = f.wait_for(|s| s.attempts == 1).await;
    assert_eq!(status.state, ConnectorState::Disconnected);
    assert!(!status.gave_up);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.connector.status().total_attempts, 1);

    f.stop().await;
}

// =========================================================================
// Live link
// =========================================================================

#[tokio::test]
async fn test_plain_text_runs_on_host_and_reports_result() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let mut ws = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    ws.send(Message::Text("/say hello".into())).await.unwrap();
    let result = next_json(&mut ws).await;
    assert_eq!(result["type"], "command_result");
    assert_eq!(result["command"], "say hello");
    assert_eq!(result["success"], true);
    assert_eq!(f.probe.commands(), vec!["say hello"]);

    ws.send(Message::Text("op steve".into())).await.unwrap();
    let result = next_json(&mut ws).await;
    assert_eq!(result["success"], false);
    assert!(result["message"].as_str().unwrap().contains("op"));
    assert_eq!(f.probe.commands(), vec!["say hello"]);

    f.stop().await;
}

#[tokio::test]
async fn test_structured_frames_use_the_same_dispatcher() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let mut ws = hub.next_conn().await;

    ws.send(Message::Text(r#"{"type":"ping","timestamp":1000}"#.into()))
        .await
        .unwrap();
    let pong = next_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["clientTimestamp"], 1000);

    ws.send(Message::Text(r#"{"type":"create_trading_floor","size":150}"#.into()))
        .await
        .unwrap();
    let err = next_json(&mut ws).await;
    assert_eq!(err["message"], "Invalid size. Must be between 3 and 100.");

    f.stop().await;
}

#[tokio::test]
async fn test_send_reaches_hub_when_connected() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let mut ws = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    f.connector
        .send(r#"{"type":"status","ok":true}"#)
        .await
        .unwrap();
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "status");

    f.stop().await;
}

#[tokio::test]
async fn test_abnormal_close_triggers_reconnect() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let first = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    drop(first);
    let _second = hub.next_conn().await;
    let status = f
        .wait_for(|s| s.state == ConnectorState::Connected && s.total_attempts == 2)
        .await;
    assert_eq!(status.attempts, 0);

    f.stop().await;
}

#[tokio::test]
async fn test_normal_close_from_hub_is_terminal() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let mut ws = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    }))
    .await
    .unwrap();

    let status = f.wait_for(|s| s.state == ConnectorState::Disconnected).await;
    assert!(!status.gave_up);
    hub.expect_no_conn(Duration::from_millis(300)).await;

    f.stop().await;
}

#[tokio::test]
async fn test_disconnect_sends_normal_close_and_stays_down() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let mut ws = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    f.connector.disconnect().await.unwrap();
    assert_eq!(f.connector.status().state, ConnectorState::Disconnected);

    let close = loop {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    assert_eq!(close.map(|c| c.code), Some(CloseCode::Normal));
    hub.expect_no_conn(Duration::from_millis(300)).await;
    assert_eq!(f.connector.send("late").await, Err(ConnectorError::NotConnected));

    f.stop().await;
}

#[tokio::test]
async fn test_force_reconnect_replaces_live_socket() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(options(hub.url()));
    f.connector.connect();
    let _first = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    f.connector.force_reconnect();
    let _second = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected && s.total_attempts == 2)
        .await;

    f.stop().await;
}

#[tokio::test]
async fn test_health_check_dials_an_idle_connector() {
    let mut hub = Hub::bind().await;
    let f = Fixture::new(ConnectorOptions {
        health_check: Duration::from_millis(50),
        ..options(hub.url())
    });

    // No explicit connect: the health check notices the link is down.
    let _ws = hub.next_conn().await;
    f.wait_for(|s| s.state == ConnectorState::Connected).await;

    f.stop().await;
}

/// Decodes like JSON but panics on every encode.
#[derive(Clone)]
struct PanickingCodec;

impl Codec for PanickingCodec {
    fn encode<T: Serialize>(&self, _value: &T) -> Result<String, ProtocolError> {
        panic!("encoder failure");
    }

    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}

#[tokio::test]
async fn test_health_check_recovers_from_dead_reader() {
    let mut hub = Hub::bind().await;
    let (host, thread) = HostLoop::spawn(
        MemoryWorld::new(),
        HostConfig {
            tick_rate_hz: 200,
            ..HostConfig::default()
        },
    )
    .unwrap();
    let executor = CommandExecutor::new(Arc::new(CommandPolicy::default()), host.clone());
    let dispatcher = Arc::new(Dispatcher::new(Role::Connector, host.clone(), executor));
    let mut connector = Connector::with_codec(
        ConnectorOptions {
            health_check: Duration::from_millis(50),
            ..options(hub.url())
        },
        dispatcher,
        PanickingCodec,
    );
    connector.connect();

    let mut first = hub.next_conn().await;
    timeout(
        Duration::from_secs(5),
        connector.wait_for(|s| s.state == ConnectorState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    // Encoding the pong kills the reader without a close being reported.
    first
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();

    let _second = hub.next_conn().await;
    let status = timeout(
        Duration::from_secs(5),
        connector.wait_for(|s| s.state == ConnectorState::Connected && s.total_attempts == 2),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(!status.gave_up);

    connector.shutdown().await;
    let _ = host.shutdown().await;
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .unwrap()
        .unwrap();
}

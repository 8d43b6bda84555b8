//! Tests for assembling a whole process from configuration.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use worldlink::config::{Role, WorldlinkConfig};
use worldlink::{App, ConfigError, ConnectorState, WorldlinkError};
use worldlink_host::MemoryWorld;

fn listener_config() -> WorldlinkConfig {
    let mut config = WorldlinkConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.host.tick_rate_hz = 200;
    config
}

#[tokio::test]
async fn test_listener_app_serves_and_shuts_down() {
    let app = App::start(&listener_config(), MemoryWorld::new())
        .await
        .unwrap();
    let addr = app.listener().expect("listener role").local_addr();
    assert!(app.connector().is_none());

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws.send(Message::Text(r#"{"type":"ping","timestamp":3}"#.into()))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            seen.push(value["type"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(seen, vec!["welcome", "pong"]);

    let host = app.host().clone();
    let closing = tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
    app.shutdown().await.unwrap();
    closing.await.unwrap();
    assert!(!host.is_running());
}

#[tokio::test]
async fn test_connector_app_starts_dialing() {
    let mut config = listener_config();
    config.set_role(Role::Connector);
    config.connector.server_url = "ws://127.0.0.1:1".into();
    config.connector.max_reconnect_attempts = 1;

    let app = App::start(&config, MemoryWorld::new()).await.unwrap();
    let connector = app.connector().expect("connector role");
    let status = timeout(Duration::from_secs(5), connector.wait_for(|s| s.gave_up))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, ConnectorState::Disconnected);
    assert_eq!(status.total_attempts, 1);

    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_app_refuses_ambiguous_role() {
    let mut config = listener_config();
    config.connector.enabled = true;

    let err = App::start(&config, MemoryWorld::new()).await.err().unwrap();
    assert!(matches!(err, WorldlinkError::Config(ConfigError::Invalid(_))));
}

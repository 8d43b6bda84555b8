//! Process configuration.
//!
//! One TOML file, read once at startup, every field defaulted:
//!
//! ```toml
//! [listener]
//! enabled = true
//! port = 8080
//!
//! [connector]
//! enabled = false
//! server-url = "ws://hub.example:9000/ws"
//!
//! [commands]
//! blocked-commands = ["give"]
//!
//! [host]
//! tick-rate-hz = 20
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use worldlink_command::PolicyConfig;
use worldlink_host::HostConfig;

use crate::ConfigError;

/// Which side of the link this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Accept many peers.
    Listener,
    /// Dial out to one hub.
    Connector,
}

/// The full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorldlinkConfig {
    pub listener: ListenerConfig,
    pub connector: ConnectorConfig,
    pub commands: PolicyConfig,
    pub host: HostConfig,
    pub logging: LoggingConfig,
}

/// The `[listener]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ListenerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// A peer silent for longer than this is disconnected.
    pub idle_timeout_ms: u64,
    /// Reported in `welcome` and `server_info`.
    pub server_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
            idle_timeout_ms: 30_000,
            server_name: "worldlink".to_string(),
        }
    }
}

impl ListenerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// The `[connector]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConnectorConfig {
    pub enabled: bool,
    pub server_url: String,
    pub auto_reconnect: bool,
    /// Consecutive failed attempts before giving up.
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub health_check_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "ws://localhost:8080/".to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 5_000,
            health_check_secs: 30,
        }
    }
}

/// The `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `worldlink=debug,info`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl WorldlinkConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The single enabled role.
    pub fn role(&self) -> Result<Role, ConfigError> {
        match (self.listener.enabled, self.connector.enabled) {
            (true, false) => Ok(Role::Listener),
            (false, true) => Ok(Role::Connector),
            (true, true) => Err(ConfigError::Invalid(
                "listener and connector are both enabled; pick one role per process".into(),
            )),
            (false, false) => Err(ConfigError::Invalid(
                "neither listener nor connector is enabled".into(),
            )),
        }
    }

    /// Enables `role` and disables the other one.
    pub fn set_role(&mut self, role: Role) {
        self.listener.enabled = role == Role::Listener;
        self.connector.enabled = role == Role::Connector;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.role()? {
            Role::Listener => {
                if self.listener.port == 0 {
                    return Err(ConfigError::Invalid("listener port must not be 0".into()));
                }
                if self.listener.idle_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "listener idle-timeout-ms must not be 0".into(),
                    ));
                }
            }
            Role::Connector => {
                if self.connector.server_url.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "connector server-url is required".into(),
                    ));
                }
                if self.connector.health_check_secs == 0 {
                    return Err(ConfigError::Invalid(
                        "connector health-check-secs must not be 0".into(),
                    ));
                }
            }
        }
        if self.host.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("host tick-rate-hz must not be 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_select_listener() {
        let config = WorldlinkConfig::default();
        assert_eq!(config.role().unwrap(), Role::Listener);
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.listener.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.connector.max_reconnect_attempts, 5);
        assert_eq!(config.connector.reconnect_delay_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_kebab_case_sections() {
        let config = WorldlinkConfig::from_toml(
            r#"
            [listener]
            enabled = false

            [connector]
            enabled = true
            server-url = "ws://hub:9000/ws"
            auto-reconnect = false
            max-reconnect-attempts = 3

            [commands]
            blocked-commands = ["give"]

            [host]
            tick-rate-hz = 10

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.role().unwrap(), Role::Connector);
        assert_eq!(config.connector.server_url, "ws://hub:9000/ws");
        assert!(!config.connector.auto_reconnect);
        assert_eq!(config.connector.max_reconnect_attempts, 3);
        assert_eq!(config.connector.reconnect_delay_ms, 5_000);
        assert_eq!(config.commands.blocked_commands, vec!["give"]);
        assert_eq!(config.host.tick_rate_hz, 10);
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_both_roles_rejected() {
        let mut config = WorldlinkConfig::default();
        config.connector.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_no_role_rejected() {
        let mut config = WorldlinkConfig::default();
        config.listener.enabled = false;
        assert!(matches!(config.role(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_set_role_switches_sections() {
        let mut config = WorldlinkConfig::default();
        config.set_role(Role::Connector);
        assert!(!config.listener.enabled);
        assert!(config.connector.enabled);
        assert_eq!(config.role().unwrap(), Role::Connector);
    }

    #[test]
    fn test_zero_port_and_tick_rate_rejected() {
        let mut config = WorldlinkConfig::default();
        config.listener.port = 0;
        assert!(config.validate().is_err());

        let mut config = WorldlinkConfig::default();
        config.host.tick_rate_hz = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connector_requires_url() {
        let mut config = WorldlinkConfig::default();
        config.set_role(Role::Connector);
        config.connector.server_url = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server-url"));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = WorldlinkConfig::from_toml("[listener\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorldlinkConfig::load(dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config, WorldlinkConfig::default());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener]\nport = 9100\nserver-name = \"market\"").unwrap();

        let config = WorldlinkConfig::load(file.path()).await.unwrap();
        assert_eq!(config.listener.port, 9100);
        assert_eq!(config.listener.server_name, "market");
        assert_eq!(config.listener.host, "0.0.0.0");
    }
}

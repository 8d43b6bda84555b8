//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Role, WorldlinkConfig};

/// Remote command-and-control link for a block world host.
#[derive(Debug, Clone, Parser)]
#[command(name = "worldlink", version, about)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, value_name = "FILE", default_value = "worldlink.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Run as this role regardless of the config file.
    #[arg(long, value_enum)]
    pub role: Option<Role>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut WorldlinkConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        if let Some(role) = self.role {
            config.set_role(role);
        }
    }
}

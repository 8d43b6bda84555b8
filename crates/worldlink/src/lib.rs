//! # worldlink
//!
//! Remote command-and-control link for a single-threaded block world
//! host.
//!
//! A process plays one of two roles over WebSocket text frames:
//!
//! - **Listener** ([`Listener`]): accepts many peers, greets each with a
//!   session id and relays structure builds and broadcasts between them.
//! - **Connector** ([`Connector`]): dials one remote hub, keeps the link
//!   alive with bounded retries and runs the plain-text instructions it
//!   receives.
//!
//! Both roles are thin adapters over one [`Dispatcher`]. Anything that
//! touches the world crosses to the `host-update` thread through a
//! [`HostHandle`](worldlink_host::HostHandle).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use worldlink::prelude::*;
//!
//! # async fn run() -> Result<(), WorldlinkError> {
//! let config = WorldlinkConfig::load("worldlink.toml").await?;
//! config.validate()?;
//! let app = App::start(&config, MemoryWorld::new()).await?;
//! tokio::signal::ctrl_c().await?;
//! app.shutdown().await
//! # }
//! ```

mod app;
pub mod cli;
pub mod config;
mod connector;
mod dispatcher;
mod error;
mod link;
mod listener;
pub mod logging;

pub use app::App;
pub use connector::{Connector, ConnectorOptions, ConnectorState, ConnectorStatus};
pub use dispatcher::{Dispatch, DispatchContext, Dispatcher};
pub use error::{ConfigError, ConnectorError, WorldlinkError};
pub use listener::{Listener, ListenerBuilder, ListenerState};

pub mod prelude {
    pub use crate::config::{Role, WorldlinkConfig};
    pub use crate::{
        App, Connector, ConnectorOptions, ConnectorState, ConnectorStatus, Dispatcher, Listener,
        ListenerBuilder, ListenerState, WorldlinkError,
    };
    pub use worldlink_command::{CommandExecutor, CommandPolicy, PolicyConfig};
    pub use worldlink_host::{HostConfig, HostHandle, HostLoop, MemoryWorld, WorldHost};
    pub use worldlink_protocol::{InboundMessage, OutboundMessage};
}

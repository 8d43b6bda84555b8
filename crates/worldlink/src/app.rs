//! Process assembly: host loop, command policy, dispatcher and one link.

use std::io;
use std::sync::Arc;

use worldlink_command::{CommandExecutor, CommandPolicy};
use worldlink_host::{HostHandle, HostLoop, HostThread, WorldHost};

use crate::config::{Role, WorldlinkConfig};
use crate::connector::{Connector, ConnectorOptions};
use crate::dispatcher::Dispatcher;
use crate::listener::{Listener, ListenerBuilder};
use crate::WorldlinkError;

enum RoleLink {
    Listener(Listener),
    Connector(Connector),
}

/// A running worldlink process.
pub struct App {
    link: RoleLink,
    host: HostHandle,
    host_thread: HostThread,
}

impl App {
    /// Moves `world` onto the host update thread and starts the
    /// configured role. A connector starts dialing immediately.
    pub async fn start<W: WorldHost>(
        config: &WorldlinkConfig,
        world: W,
    ) -> Result<Self, WorldlinkError> {
        let role = config.role()?;
        let (host, host_thread) = HostLoop::spawn(world, config.host.clone())?;

        let policy = Arc::new(CommandPolicy::new(&config.commands));
        let executor = CommandExecutor::new(policy, host.clone());
        let dispatcher = Arc::new(Dispatcher::new(role, host.clone(), executor));

        let link = match role {
            Role::Listener => {
                match ListenerBuilder::from_config(&config.listener)
                    .start(dispatcher)
                    .await
                {
                    Ok(listener) => RoleLink::Listener(listener),
                    Err(e) => {
                        stop_host(&host, host_thread).await?;
                        return Err(e);
                    }
                }
            }
            Role::Connector => {
                let connector =
                    Connector::spawn(ConnectorOptions::from(&config.connector), dispatcher);
                connector.connect();
                RoleLink::Connector(connector)
            }
        };
        tracing::info!(?role, "worldlink started");

        Ok(Self {
            link,
            host,
            host_thread,
        })
    }

    pub fn listener(&self) -> Option<&Listener> {
        match &self.link {
            RoleLink::Listener(listener) => Some(listener),
            RoleLink::Connector(_) => None,
        }
    }

    pub fn connector(&self) -> Option<&Connector> {
        match &self.link {
            RoleLink::Connector(connector) => Some(connector),
            RoleLink::Listener(_) => None,
        }
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Shuts the link down gracefully, then stops the host loop after it
    /// has flushed pending writes.
    pub async fn shutdown(mut self) -> Result<(), WorldlinkError> {
        match &mut self.link {
            RoleLink::Listener(listener) => listener.shutdown().await,
            RoleLink::Connector(connector) => connector.shutdown().await,
        }
        stop_host(&self.host, self.host_thread).await?;
        tracing::info!("worldlink stopped");
        Ok(())
    }
}

async fn stop_host(host: &HostHandle, thread: HostThread) -> Result<(), WorldlinkError> {
    // Already stopped is fine.
    let _ = host.shutdown().await;
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .map_err(io::Error::other)??;
    Ok(())
}

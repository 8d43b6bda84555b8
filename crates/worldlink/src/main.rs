use std::process::ExitCode;

use clap::Parser;
use worldlink::cli::Cli;
use worldlink::config::WorldlinkConfig;
use worldlink::{App, WorldlinkError, logging};
use worldlink_host::MemoryWorld;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("worldlink: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), WorldlinkError> {
    let mut config = WorldlinkConfig::load(&cli.config).await?;
    cli.apply(&mut config);
    config.validate()?;
    logging::init(&config.logging)?;

    let app = App::start(&config, MemoryWorld::new()).await?;
    shutdown_signal().await?;
    tracing::info!("shutdown signal received");
    app.shutdown().await
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

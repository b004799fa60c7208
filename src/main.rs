//! Process entry point: wire the core together and drive the reactor on the
//! main thread.

use std::process::ExitCode;
use std::sync::Arc;

use brimstone_network::{Server, ServerConfig};
use brimstone_server::{game_loop, GameHandler, TickArenas};
use tracing::{error, info};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("brimstone=trace,info")),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    info!("starting server");

    // The configuration layer will eventually populate this from disk.
    let config = ServerConfig::default();

    let arenas = Arc::new(TickArenas::new()?);
    game_loop::spawn(Arc::clone(&arenas))?;

    let handler = GameHandler::new(Arc::clone(&arenas), &config);
    let mut server = Server::bind(config, handler)?;

    server.run()?;
    Ok(())
}

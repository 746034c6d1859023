mod server;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use relaycast_api::AppState;
use relaycast_core::fanout::FanoutCoordinator;
use relaycast_core::media::WorkerPool;
use relaycast_core::registry::Registry;
use relaycast_core::{logging, Config};

use server::RelaycastServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (`relaycast [config-file]`)
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        anyhow::bail!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        );
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("relaycast starting...");
    info!("Control plane address: {}", config.http_address());
    info!("Signaling address: {}", config.websocket_address());
    for warning in config.production_warnings() {
        warn!("{warning}");
    }

    let config = Arc::new(config);

    // 4. Media worker pool. Worker death is unrecoverable: log, give the
    // sinks a moment to flush, exit non-zero.
    let (dead_tx, mut dead_rx) = tokio::sync::mpsc::unbounded_channel();
    let pool = Arc::new(WorkerPool::new(&config, dead_tx).await?);

    tokio::spawn(async move {
        if let Some(death) = dead_rx.recv().await {
            error!("{}; terminating", death.message);
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            std::process::exit(1);
        }
    });

    // 5. Room registry and fan-out coordinator
    let registry = Arc::new(Registry::new(&config, Arc::clone(&pool)));
    let fanout = Arc::new(FanoutCoordinator::new());

    // 6. Control plane, signaling server, reaper
    let state = AppState::new(Arc::clone(&config), Arc::clone(&registry), fanout);
    RelaycastServer::new(config, registry, state).start().await
}

//! Server lifecycle management
//!
//! Boots the control-plane and signaling listeners plus the background
//! reaper, then waits for a termination signal. Shutdown runs in strict
//! reverse order of boot: listeners stop accepting, every room (and with
//! it every peer, transport, producer and consumer) is closed through
//! the registry, and only then do the routers go away.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use relaycast_api::{http, ws, AppState};
use relaycast_core::registry::Registry;
use relaycast_core::Config;

/// How often the reaper checks for idle rooms and logs server stats.
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// How long shutdown waits for in-flight sessions before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct RelaycastServer {
    config: Arc<Config>,
    registry: Arc<Registry>,
    state: AppState,
}

impl RelaycastServer {
    pub const fn new(config: Arc<Config>, registry: Arc<Registry>, state: AppState) -> Self {
        Self {
            config,
            registry,
            state,
        }
    }

    /// Start all servers and block until shutdown completes.
    pub async fn start(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let http_listener = TcpListener::bind(self.config.http_address()).await?;
        info!("Control plane listening on {}", self.config.http_address());
        let http_handle = tokio::spawn(serve(
            http_listener,
            http::create_router(self.state.clone()),
            shutdown_rx.clone(),
        ));

        let ws_listener = TcpListener::bind(self.config.websocket_address()).await?;
        info!("Signaling server listening on {}", self.config.websocket_address());
        let ws_handle = tokio::spawn(serve(
            ws_listener,
            ws::create_router(self.state.clone()),
            shutdown_rx.clone(),
        ));

        let reaper_handle = tokio::spawn(reaper_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
            shutdown_rx,
        ));

        shutdown_signal().await;
        info!("Shutdown signal received, stopping...");
        let _ = shutdown_tx.send(true);

        // Closing the rooms evicts every session, which in turn lets the
        // listeners' graceful shutdown complete.
        self.registry.shutdown();

        for (name, handle) in [
            ("signaling", ws_handle),
            ("control plane", http_handle),
            ("reaper", reaper_handle),
        ] {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("{name} did not stop within the grace period");
            }
        }

        info!("relaycast stopped");
        Ok(())
    }
}

async fn serve(listener: TcpListener, router: Router, mut shutdown_rx: watch::Receiver<bool>) {
    let shutdown = async move {
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
    };
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {e}");
    }
}

/// Periodic eviction of idle rooms plus a stats log line whenever
/// anything is live.
async fn reaper_loop(
    registry: Arc<Registry>,
    config: Arc<Config>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(REAPER_INTERVAL);
    let idle_timeout = Duration::from_secs(config.rooms.idle_timeout_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                registry.reap_idle(idle_timeout);

                let (rooms, peers) = registry.counts();
                if rooms > 0 || peers > 0 {
                    let stats = registry.server_stats();
                    info!(
                        rooms = stats.total_rooms,
                        active_rooms = stats.active_rooms,
                        peers = stats.total_peers,
                        hosts = stats.total_hosts,
                        viewers = stats.total_viewers,
                        "Server stats"
                    );
                }
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

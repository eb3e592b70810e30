mod config;
mod network;

use config::ServerConfig;
use quarry_protocol_core::{ServerStatus, StatusSource, VersionRegistry};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Status answers for legacy pings: config-backed description and limits,
/// live count of recognized connections.
struct LiveStatus {
    config: Arc<ServerConfig>,
    online: Arc<AtomicUsize>,
}

impl StatusSource for LiveStatus {
    fn status(&self) -> ServerStatus {
        ServerStatus {
            description: self.config.motd.clone(),
            online_players: self.online.load(Ordering::Relaxed),
            max_players: self.config.max_players as usize,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Quarry server...");

    let config = Arc::new(ServerConfig::load(Path::new("config/server.toml"))?);
    info!(
        "Config loaded: bind={}:{}, max_players={}",
        config.bind, config.port, config.max_players
    );

    let registry = Arc::new(quarry_protocol_classic::default_registry());
    info!(
        "Serving client versions {} (protocols {})",
        registry.client_versions(),
        registry.protocol_versions()
    );

    let online = Arc::new(AtomicUsize::new(0));
    let status: Arc<dyn StatusSource> = Arc::new(LiveStatus {
        config: config.clone(),
        online: online.clone(),
    });

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    tokio::select! {
        _ = accept_loop(listener, registry, status, online) => {
            error!("Accept loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<VersionRegistry>,
    status: Arc<dyn StatusSource>,
    online: Arc<AtomicUsize>,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!("New connection from {}", peer);
                let registry = registry.clone();
                let status = status.clone();
                let online = online.clone();
                tokio::spawn(async move {
                    network::handle_connection(socket, registry, status, online).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

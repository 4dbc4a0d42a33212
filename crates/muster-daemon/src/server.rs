//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::scheduler::Scheduler;
use muster_registry::Registry;
use muster_replication::ReplicationChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Muster registry node
pub struct Server {
    config: DaemonConfig,
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    channel: ReplicationChannel,
    rebuild_rx: mpsc::Receiver<()>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        // Replication channel and the sender local writes go out on
        let mut channel = ReplicationChannel::new(config.replication_config())?;
        let replication_tx = channel.start();

        // Write bursts nudge the cache loop through this channel
        let (rebuild_tx, rebuild_rx) = mpsc::channel(4);

        let mut registry = Registry::new(config.node_name(), config.registry_config())
            .with_rebuild_trigger(rebuild_tx);
        if channel.has_peers() {
            registry = registry.with_replication(replication_tx);
        }
        let registry = Arc::new(registry);

        let scheduler = Scheduler::new(
            registry.clone(),
            Duration::from_secs(config.registry.eviction_interval_seconds),
            Duration::from_secs(config.cache.rebuild_interval_seconds),
        );

        Ok(Self {
            config,
            registry,
            scheduler,
            channel,
            rebuild_rx,
        })
    }

    /// Registry this server serves
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Bind the configured address and run until shutdown
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already-bound listener
    pub async fn serve(mut self, listener: TcpListener) -> DaemonResult<()> {
        // Bootstrap the lease table from a peer before taking traffic
        if self.config.replication.sync_on_startup && self.channel.has_peers() {
            match self.channel.pull_snapshot().await {
                Ok((peer, leases)) => {
                    let seeded = self.registry.seed(leases, chrono::Utc::now());
                    self.registry.rebuild_cache(chrono::Utc::now());
                    tracing::info!(peer = %peer, seeded, "Seeded registry from peer snapshot");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "No peer snapshot available, starting empty");
                }
            }
        }

        // Create app state
        let state = AppState::new(
            self.registry.clone(),
            self.channel.stats(),
            self.channel.peers().to_vec(),
        );

        // Create router
        let app = create_router(state, self.config.server.enable_cors);

        tracing::info!(
            "Muster registry node {} listening on {}",
            self.registry.node(),
            listener.local_addr()?
        );

        // Start scheduler in background
        let scheduler = self.scheduler.clone();
        let rebuild_rx = self.rebuild_rx;
        tokio::spawn(async move {
            scheduler.start(rebuild_rx).await;
        });

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error::DaemonError::Server(e.to_string()))?;

        tracing::info!("Muster registry node shutting down");

        // Stop background work
        self.scheduler.stop().await;
        self.channel.shutdown();

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

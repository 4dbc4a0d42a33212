//! musterd - Service discovery registry node
//!
//! A musterd node provides:
//! - REST API for instance registration, renewal, cancellation and queries
//! - Heartbeat-driven lease eviction with self-preservation
//! - Best-effort peer replication of every accepted write
//! - A periodically rebuilt read cache serving all queries

use clap::Parser;
use muster_daemon::config::DaemonConfig;
use muster_daemon::error::{DaemonError, DaemonResult};
use muster_daemon::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// musterd CLI
#[derive(Parser)]
#[command(name = "musterd")]
#[command(about = "muster - Service discovery registry node", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MUSTER_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "MUSTER_LISTEN_ADDR")]
    listen: Option<String>,

    /// Node name reported as the origin of this node's writes
    #[arg(short, long, env = "MUSTER_NODE_NAME")]
    node: Option<String>,

    /// Peer base URLs, comma separated
    #[arg(short, long, env = "MUSTER_PEERS", value_delimiter = ',')]
    peers: Option<Vec<String>>,

    /// Log level
    #[arg(long, env = "MUSTER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "MUSTER_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(node) = cli.node {
        config.node.name = node;
    }
    if let Some(peers) = cli.peers {
        config.replication.peers = peers;
    }

    // Print startup banner
    println!(
        r#"
  _ __ ___  _   _ ___| |_ ___ _ __
 | '_ ` _ \| | | / __| __/ _ \ '__|
 | | | | | | |_| \__ \ ||  __/ |
 |_| |_| |_|\__,_|___/\__\___|_|

  muster - Service Discovery Registry
  Version: {}
  Node: {}
  Peers: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.node.name,
        config.replication.peers.len(),
        config.server.listen_addr
    );

    // Create and run server
    let server = Server::new(config)?;
    server.run().await
}

//! Application state for API handlers

use muster_registry::Registry;
use muster_replication::{PeerNode, ReplicationStats};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Registry facade
    pub registry: Arc<Registry>,

    /// Replication delivery counters
    pub replication_stats: Arc<ReplicationStats>,

    /// Configured replication peers
    pub peers: Arc<Vec<Arc<PeerNode>>>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        registry: Arc<Registry>,
        replication_stats: Arc<ReplicationStats>,
        peers: Vec<Arc<PeerNode>>,
    ) -> Self {
        Self {
            registry,
            replication_stats,
            peers: Arc::new(peers),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}

//! Health and status handlers

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use muster_registry::RegistryStats;
use muster_replication::{PeerStatus, ReplicationStatsView};
use muster_types::NodeName;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Node status response
#[derive(Debug, Serialize)]
pub struct NodeStatusResponse {
    pub node: NodeName,
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub registry: RegistryStats,
    pub replication: ReplicationStatsView,
    pub peers: Vec<PeerStatus>,
}

/// Node status endpoint
pub async fn node_status(State(state): State<AppState>) -> Json<NodeStatusResponse> {
    let peers = state.peers.iter().map(|peer| peer.status()).collect();

    Json(NodeStatusResponse {
        node: state.registry.node().clone(),
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
        registry: state.registry.stats(Utc::now()),
        replication: state.replication_stats.view(),
        peers,
    })
}

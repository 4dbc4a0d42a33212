//! Peer-to-peer replication handlers
//!
//! Peers push write events here and pull full lease snapshots when they
//! bootstrap. Applied events are never forwarded again, so a write
//! fans out exactly one hop from the node that accepted it.

use crate::api::rest::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use muster_types::{Lease, ReplicationEvent};

/// Apply a replicated write from a peer.
///
/// Conflicts resolve by last-writer-wins on the record's dirty
/// timestamp, so applying is unconditional from the peer's point of
/// view; a stale event is acknowledged and dropped.
pub async fn apply_replication_event(
    State(state): State<AppState>,
    Json(event): Json<ReplicationEvent>,
) -> StatusCode {
    state.registry.apply_replicated(event, Utc::now());
    StatusCode::NO_CONTENT
}

/// Serve the full set of live leases for a bootstrapping peer.
pub async fn get_lease_snapshot(State(state): State<AppState>) -> Json<Vec<Lease>> {
    Json(state.registry.lease_snapshot())
}

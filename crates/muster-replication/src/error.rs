//! Replication error types

use thiserror::Error;

/// Replication errors
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Peer unreachable: {url}: {reason}")]
    PeerUnreachable { url: String, reason: String },

    #[error("Peer {url} rejected request with status {status}")]
    PeerRejected { url: String, status: u16 },

    #[error("No peer could serve a registry snapshot")]
    SnapshotUnavailable,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;

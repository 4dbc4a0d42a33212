//! HTTP client for peer replication endpoints

use crate::error::{ReplicationError, Result};
use crate::peer::PeerNode;
use muster_types::{Lease, ReplicationEvent};
use std::time::Duration;

/// Thin wrapper around a shared HTTP client, speaking the two peer
/// endpoints: event push and snapshot pull.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// POST one replication event to a peer.
    pub async fn send_event(&self, peer: &PeerNode, event: &ReplicationEvent) -> Result<()> {
        let url = format!("{}/peer/events", peer.base_url());
        let response = self
            .http
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|err| ReplicationError::PeerUnreachable {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ReplicationError::PeerRejected {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// GET the full lease snapshot from a peer.
    pub async fn fetch_snapshot(&self, peer: &PeerNode) -> Result<Vec<Lease>> {
        let url = format!("{}/peer/snapshot", peer.base_url());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| ReplicationError::PeerUnreachable {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ReplicationError::PeerRejected {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

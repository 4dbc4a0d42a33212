//! Replication channel
//!
//! Local writes are enqueued onto one bounded channel. A dispatcher
//! task fans each event out to bounded per-peer queues, and one worker
//! per peer drains its queue over HTTP. A slow or dead peer fills only
//! its own queue; other peers and the write path never wait on it.
//! Delivery is at-most-once: an event that exhausts its retry budget is
//! counted and dropped.

use crate::client::PeerClient;
use crate::error::{ReplicationError, Result};
use crate::peer::{PeerNode, PeerStatus};
use chrono::Utc;
use muster_types::{Lease, ReplicationEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Tunables for the replication channel
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Base URLs of the other registry nodes
    pub peers: Vec<String>,

    /// Capacity of the inbound queue local writes are enqueued onto
    pub queue_capacity: usize,

    /// Capacity of each per-peer delivery queue
    pub peer_queue_capacity: usize,

    /// Timeout for one HTTP request to a peer
    pub request_timeout: Duration,

    /// Delivery attempts per event before it is dropped
    pub max_attempts: u32,

    /// Base delay between attempts, doubled per retry
    pub retry_backoff: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            queue_capacity: 1024,
            peer_queue_capacity: 256,
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Delivery counters shared between the workers and the status endpoint
#[derive(Debug, Default)]
pub struct ReplicationStats {
    events_sent: AtomicU64,
    events_retried: AtomicU64,
    events_failed: AtomicU64,
    events_dropped: AtomicU64,
    snapshots_pulled: AtomicU64,
}

/// Point-in-time copy of the delivery counters
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationStatsView {
    /// Events delivered to a peer
    pub events_sent: u64,
    /// Failed attempts that were retried
    pub events_retried: u64,
    /// Events dropped after exhausting their retry budget
    pub events_failed: u64,
    /// Events dropped because a peer queue was full
    pub events_dropped: u64,
    /// Snapshots fetched from peers
    pub snapshots_pulled: u64,
}

impl ReplicationStats {
    fn record_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self) {
        self.events_retried.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_snapshot(&self) {
        self.snapshots_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    pub fn events_failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }

    pub fn view(&self) -> ReplicationStatsView {
        ReplicationStatsView {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_retried: self.events_retried.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            snapshots_pulled: self.snapshots_pulled.load(Ordering::Relaxed),
        }
    }
}

/// Fan-out delivery of replication events to all configured peers
#[derive(Debug)]
pub struct ReplicationChannel {
    config: ReplicationConfig,
    client: PeerClient,
    peers: Vec<Arc<PeerNode>>,
    stats: Arc<ReplicationStats>,
    workers: Vec<JoinHandle<()>>,
}

impl ReplicationChannel {
    pub fn new(config: ReplicationConfig) -> Result<Self> {
        let client = PeerClient::new(config.request_timeout)?;
        let peers = config
            .peers
            .iter()
            .map(|url| Arc::new(PeerNode::new(url.clone())))
            .collect();
        Ok(Self {
            config,
            client,
            peers,
            stats: Arc::new(ReplicationStats::default()),
            workers: Vec::new(),
        })
    }

    pub fn has_peers(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn peers(&self) -> &[Arc<PeerNode>] {
        &self.peers
    }

    pub fn peer_statuses(&self) -> Vec<PeerStatus> {
        self.peers.iter().map(|peer| peer.status()).collect()
    }

    pub fn stats(&self) -> Arc<ReplicationStats> {
        self.stats.clone()
    }

    /// Spawn the dispatcher and one delivery worker per peer.
    ///
    /// Returns the sender the registry enqueues local writes onto.
    pub fn start(&mut self) -> mpsc::Sender<ReplicationEvent> {
        let (tx, mut rx) = mpsc::channel::<ReplicationEvent>(self.config.queue_capacity);

        let mut peer_queues = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            let (peer_tx, peer_rx) = mpsc::channel(self.config.peer_queue_capacity);
            peer_queues.push((peer.clone(), peer_tx));
            self.workers.push(tokio::spawn(run_worker(
                peer.clone(),
                peer_rx,
                self.client.clone(),
                self.stats.clone(),
                self.config.max_attempts,
                self.config.retry_backoff,
            )));
        }

        let stats = self.stats.clone();
        self.workers.push(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for (peer, peer_tx) in &peer_queues {
                    if peer_tx.try_send(event.clone()).is_err() {
                        stats.record_drop();
                        warn!(
                            peer = %peer.base_url(),
                            kind = event.kind(),
                            "Peer queue full, dropping replication event"
                        );
                    }
                }
            }
            debug!("Replication dispatcher stopped");
        }));

        info!(peers = self.peers.len(), "Replication channel started");
        tx
    }

    /// Fetch a registry snapshot from the first peer that answers,
    /// trying peers in configuration order.
    pub async fn pull_snapshot(&self) -> Result<(String, Vec<Lease>)> {
        for peer in &self.peers {
            match self.client.fetch_snapshot(peer).await {
                Ok(leases) => {
                    peer.mark_success(Utc::now());
                    self.stats.record_snapshot();
                    info!(
                        peer = %peer.base_url(),
                        leases = leases.len(),
                        "Pulled registry snapshot from peer"
                    );
                    return Ok((peer.base_url().to_string(), leases));
                }
                Err(err) => {
                    peer.mark_failure();
                    warn!(peer = %peer.base_url(), error = %err, "Peer snapshot unavailable");
                }
            }
        }
        Err(ReplicationError::SnapshotUnavailable)
    }

    /// Abort the dispatcher and all delivery workers.
    pub fn shutdown(&mut self) {
        for handle in self.workers.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ReplicationChannel {
    fn drop(&mut self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn run_worker(
    peer: Arc<PeerNode>,
    mut rx: mpsc::Receiver<ReplicationEvent>,
    client: PeerClient,
    stats: Arc<ReplicationStats>,
    max_attempts: u32,
    retry_backoff: Duration,
) {
    while let Some(event) = rx.recv().await {
        // an unreachable peer gets one probe per event, on a growing delay
        let failures = peer.consecutive_failures();
        if failures >= max_attempts {
            let delay = reconnect_backoff(retry_backoff, failures);
            debug!(
                peer = %peer.base_url(),
                failures,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retrying unreachable peer"
            );
            sleep(delay).await;
        }
        deliver(&peer, &client, &stats, &event, max_attempts, retry_backoff).await;
    }
    debug!(peer = %peer.base_url(), "Replication worker stopped");
}

async fn deliver(
    peer: &PeerNode,
    client: &PeerClient,
    stats: &ReplicationStats,
    event: &ReplicationEvent,
    max_attempts: u32,
    retry_backoff: Duration,
) {
    for attempt in 1..=max_attempts {
        match client.send_event(peer, event).await {
            Ok(()) => {
                peer.mark_success(Utc::now());
                stats.record_sent();
                if attempt > 1 {
                    debug!(
                        peer = %peer.base_url(),
                        kind = event.kind(),
                        attempt,
                        "Replication event delivered after retry"
                    );
                }
                return;
            }
            Err(err) => {
                peer.mark_failure();
                if attempt < max_attempts {
                    stats.record_retry();
                    let delay = retry_backoff * 2u32.pow(attempt - 1);
                    debug!(
                        peer = %peer.base_url(),
                        kind = event.kind(),
                        attempt,
                        error = %err,
                        "Replication attempt failed, retrying"
                    );
                    sleep(delay).await;
                } else {
                    stats.record_failure();
                    warn!(
                        peer = %peer.base_url(),
                        kind = event.kind(),
                        service = %event.service(),
                        instance_id = %event.instance_id(),
                        attempts = max_attempts,
                        error = %err,
                        "Dropping replication event after exhausting retries"
                    );
                }
            }
        }
    }
}

fn reconnect_backoff(base: Duration, failures: u32) -> Duration {
    let capped = failures.min(6);
    (base * 2u32.pow(capped)).min(Duration::from_secs(30))
}

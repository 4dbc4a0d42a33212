//! muster-replication - Peer-to-peer write forwarding
//!
//! Registry nodes share every accepted write with their peers on a
//! best-effort basis. This crate owns the outbound side: the bounded
//! queues, the per-peer delivery workers with retry and backoff, and
//! the snapshot pull used to bootstrap an empty node. The inbound side
//! lives in the daemon's peer endpoints, which feed
//! `Registry::apply_replicated`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod channel;
pub mod client;
pub mod error;
pub mod peer;

// Re-exports
pub use channel::{ReplicationChannel, ReplicationConfig, ReplicationStats, ReplicationStatsView};
pub use client::PeerClient;
pub use error::{ReplicationError, Result};
pub use peer::{PeerNode, PeerStatus};

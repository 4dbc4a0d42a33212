//! Peer node state
//!
//! Reachability is inferred from replication traffic itself: a
//! delivered event or snapshot marks the peer reachable, a failed one
//! marks it unreachable and bumps the failure streak that drives the
//! worker's backoff.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// One configured replication peer
#[derive(Debug)]
pub struct PeerNode {
    base_url: String,
    reachable: AtomicBool,
    consecutive_failures: AtomicU32,
    last_contact_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time peer state for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub url: String,
    pub reachable: bool,
    pub consecutive_failures: u32,
    pub last_contact_at: Option<DateTime<Utc>>,
}

impl PeerNode {
    /// Peers start out assumed reachable until a send says otherwise.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            reachable: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            last_contact_at: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn mark_success(&self, now: DateTime<Utc>) {
        self.reachable.store(true, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        if let Ok(mut last) = self.last_contact_at.lock() {
            *last = Some(now);
        }
    }

    /// Returns the new failure streak length.
    pub fn mark_failure(&self) -> u32 {
        self.reachable.store(false, Ordering::Release);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn last_contact_at(&self) -> Option<DateTime<Utc>> {
        self.last_contact_at.lock().ok().and_then(|last| *last)
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            url: self.base_url.clone(),
            reachable: self.is_reachable(),
            consecutive_failures: self.consecutive_failures(),
            last_contact_at: self.last_contact_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let peer = PeerNode::new("http://10.0.0.2:8761/");
        assert_eq!(peer.base_url(), "http://10.0.0.2:8761");
    }

    #[test]
    fn test_failure_streak_and_recovery() {
        let peer = PeerNode::new("http://10.0.0.2:8761");
        assert!(peer.is_reachable());
        assert!(peer.last_contact_at().is_none());

        assert_eq!(peer.mark_failure(), 1);
        assert_eq!(peer.mark_failure(), 2);
        assert!(!peer.is_reachable());

        let now = Utc::now();
        peer.mark_success(now);
        assert!(peer.is_reachable());
        assert_eq!(peer.consecutive_failures(), 0);
        assert_eq!(peer.last_contact_at(), Some(now));
    }
}

//! Lease types
//!
//! Every registered instance is held under a Lease. The lease is kept
//! alive by heartbeat renewals; a lease whose renewal deadline has
//! passed becomes a candidate for eviction.

use crate::ServiceInstance;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lease duration applied when a registration does not specify one
pub const DEFAULT_LEASE_DURATION_SECONDS: u64 = 30;

/// A lease binding an instance to the registry for as long as it renews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// The instance this lease covers
    pub instance: ServiceInstance,

    /// When the instance first registered
    pub registered_at: DateTime<Utc>,

    /// Last successful heartbeat renewal
    pub last_renewed_at: DateTime<Utc>,

    /// Seconds a renewal keeps the lease alive for
    pub duration_seconds: u64,

    /// Set when the sweeper marks the lease for removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evicted_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn new(instance: ServiceInstance, duration_seconds: u64, now: DateTime<Utc>) -> Self {
        Self {
            instance,
            registered_at: now,
            last_renewed_at: now,
            duration_seconds,
            evicted_at: None,
        }
    }

    /// Refresh the renewal timestamp. Nothing else on the lease changes.
    pub fn renew(&mut self, now: DateTime<Utc>) {
        self.last_renewed_at = now;
    }

    /// Instant after which the lease counts as expired.
    ///
    /// The multiplier stretches the nominal duration so that a single
    /// missed heartbeat does not expire the lease.
    pub fn expiry_deadline(&self, threshold_multiplier: f64) -> DateTime<Utc> {
        let grace_ms = (self.duration_seconds as f64 * threshold_multiplier * 1_000.0) as i64;
        self.last_renewed_at + Duration::milliseconds(grace_ms)
    }

    /// A lease is expired only when the deadline has strictly passed.
    pub fn is_expired(&self, now: DateTime<Utc>, threshold_multiplier: f64) -> bool {
        self.expiry_deadline(threshold_multiplier) < now
    }

    pub fn mark_evicted(&mut self, now: DateTime<Utc>) {
        self.evicted_at = Some(now);
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted_at.is_some()
    }
}

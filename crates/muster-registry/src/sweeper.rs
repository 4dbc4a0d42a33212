//! Eviction planning
//!
//! The sweeper turns the current lease population into an eviction
//! plan: which expired leases may actually be removed this pass. While
//! self-preservation is active the plan is capped to a configurable
//! fraction of the expired set (zero by default), oldest renewals
//! first, so a registry that has lost contact with its clients decays
//! slowly instead of emptying itself.

use chrono::{DateTime, Utc};
use muster_types::{InstanceId, Lease, ServiceName};

/// Result of one eviction pass
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Leases found expired at sweep time
    pub expired: usize,
    /// Leases actually removed
    pub evicted: Vec<(ServiceName, InstanceId)>,
    /// Expired leases left in place
    pub suppressed: usize,
}

impl SweepOutcome {
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }
}

/// Expired leases the sweeper is allowed to remove this pass
#[derive(Debug)]
pub(crate) struct EvictionPlan {
    pub expired: usize,
    pub victims: Vec<(ServiceName, InstanceId)>,
}

pub(crate) fn plan_evictions(
    leases: &[Lease],
    now: DateTime<Utc>,
    threshold_multiplier: f64,
    self_preservation: bool,
    cap_fraction: f64,
) -> EvictionPlan {
    let mut expired: Vec<&Lease> = leases
        .iter()
        .filter(|lease| lease.is_expired(now, threshold_multiplier))
        .collect();
    expired.sort_by_key(|lease| lease.last_renewed_at);

    let allowed = if self_preservation {
        (expired.len() as f64 * cap_fraction).floor() as usize
    } else {
        expired.len()
    };

    let victims = expired
        .iter()
        .take(allowed)
        .map(|lease| (lease.instance.service.clone(), lease.instance.id.clone()))
        .collect();

    EvictionPlan {
        expired: expired.len(),
        victims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use muster_types::ServiceInstance;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn lease(id: &str, renewed_at: i64) -> Lease {
        let instance = ServiceInstance::new("orders", id, "10.0.0.5", 8080);
        let mut lease = Lease::new(instance, 30, at(0));
        lease.last_renewed_at = at(renewed_at);
        lease
    }

    #[test]
    fn test_plan_evicts_all_expired_when_healthy() {
        // 30s duration, 2.0 multiplier: expired once renewal is >60s old
        let leases = vec![lease("a", 0), lease("b", 100), lease("c", 150)];
        let plan = plan_evictions(&leases, at(200), 2.0, false, 0.0);
        assert_eq!(plan.expired, 2);
        assert_eq!(plan.victims.len(), 2);
        // oldest renewal goes first
        assert_eq!(plan.victims[0].1, InstanceId::new("a"));
        assert_eq!(plan.victims[1].1, InstanceId::new("b"));
    }

    #[test]
    fn test_self_preservation_suppresses_everything_by_default() {
        let leases = vec![lease("a", 0), lease("b", 10), lease("c", 20)];
        let plan = plan_evictions(&leases, at(500), 2.0, true, 0.0);
        assert_eq!(plan.expired, 3);
        assert!(plan.victims.is_empty());
    }

    #[test]
    fn test_cap_fraction_allows_partial_eviction() {
        let leases: Vec<Lease> = (0..10).map(|i| lease(&format!("i{i}"), i * 5)).collect();
        let plan = plan_evictions(&leases, at(1000), 2.0, true, 0.3);
        assert_eq!(plan.expired, 10);
        // floor(10 * 0.3) = 3, oldest first
        assert_eq!(plan.victims.len(), 3);
        assert_eq!(plan.victims[0].1, InstanceId::new("i0"));
        assert_eq!(plan.victims[2].1, InstanceId::new("i2"));
    }

    #[test]
    fn test_fresh_leases_are_not_candidates() {
        let leases = vec![lease("a", 190), lease("b", 195)];
        let plan = plan_evictions(&leases, at(200), 2.0, false, 0.0);
        assert_eq!(plan.expired, 0);
        assert!(plan.victims.is_empty());
    }
}

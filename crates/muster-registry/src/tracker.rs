//! Renewal rate tracking and self-preservation
//!
//! The tracker counts heartbeat renewals in one-minute buckets over a
//! sliding window and compares the observed rate against the rate the
//! registered leases should produce. When renewals collapse below the
//! threshold the registry assumes a network problem rather than mass
//! instance death and suspends eviction.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Width of the renewal rate window, in one-minute buckets
const WINDOW_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    minute: i64,
    count: u64,
}

impl Bucket {
    const EMPTY: Bucket = Bucket {
        minute: i64::MIN,
        count: 0,
    };
}

#[derive(Debug)]
struct TrackerState {
    buckets: [Bucket; WINDOW_MINUTES as usize],
    /// Renewals per minute the current lease population should produce
    expected_per_min: f64,
    /// First minute the tracker observed, bounds the window denominator
    anchor_minute: Option<i64>,
}

/// Sliding-window renewal counter driving self-preservation
#[derive(Debug)]
pub struct RenewalTracker {
    enabled: bool,
    threshold_fraction: f64,
    state: Mutex<TrackerState>,
}

impl RenewalTracker {
    pub fn new(enabled: bool, threshold_fraction: f64) -> Self {
        Self {
            enabled,
            threshold_fraction,
            state: Mutex::new(TrackerState {
                buckets: [Bucket::EMPTY; WINDOW_MINUTES as usize],
                expected_per_min: 0.0,
                anchor_minute: None,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count one accepted renewal, local or replicated.
    pub fn record_renewal(&self, now: DateTime<Utc>) {
        let minute = minute_of(now);
        let mut state = self.lock();
        state.anchor_minute.get_or_insert(minute);
        let idx = minute.rem_euclid(WINDOW_MINUTES) as usize;
        if state.buckets[idx].minute != minute {
            state.buckets[idx] = Bucket { minute, count: 0 };
        }
        state.buckets[idx].count += 1;
    }

    /// A lease joined the registry; it owes `60 / duration` renewals per minute.
    pub fn lease_added(&self, duration_seconds: u64) {
        let mut state = self.lock();
        state.expected_per_min += renewals_owed(duration_seconds);
    }

    /// A lease left the registry, by cancellation or eviction.
    pub fn lease_removed(&self, duration_seconds: u64) {
        let mut state = self.lock();
        state.expected_per_min = (state.expected_per_min - renewals_owed(duration_seconds)).max(0.0);
    }

    /// Renewals per minute the current lease population should produce
    pub fn expected_per_min(&self) -> f64 {
        self.lock().expected_per_min
    }

    /// Expected rate scaled by the threshold fraction, as operators see it
    pub fn renewal_threshold(&self) -> u64 {
        (self.lock().expected_per_min * self.threshold_fraction).ceil() as u64
    }

    /// Observed renewals per minute, averaged over the window.
    ///
    /// The denominator is the minutes actually observed, capped at the
    /// window width, so a freshly started node is not judged against
    /// minutes it was not running for.
    pub fn renewals_per_min(&self, now: DateTime<Utc>) -> f64 {
        let minute = minute_of(now);
        let mut state = self.lock();
        let anchor = *state.anchor_minute.get_or_insert(minute);
        let span = (minute - anchor + 1).clamp(1, WINDOW_MINUTES);
        let total: u64 = state
            .buckets
            .iter()
            .filter(|b| b.minute > minute - WINDOW_MINUTES && b.minute <= minute)
            .map(|b| b.count)
            .sum();
        total as f64 / span as f64
    }

    /// Whether the registry should hold evictions back right now.
    ///
    /// Requires tracking to be enabled and at least one lease to be
    /// registered; an empty registry is never in self-preservation.
    pub fn self_preservation_active(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let expected = self.expected_per_min();
        if expected <= 0.0 {
            return false;
        }
        self.renewals_per_min(now) < expected * self.threshold_fraction
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn minute_of(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(60)
}

fn renewals_owed(duration_seconds: u64) -> f64 {
    60.0 / duration_seconds.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_minute(min: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + min * 60, 0).unwrap()
    }

    fn tracker_with_instances(count: usize) -> RenewalTracker {
        let tracker = RenewalTracker::new(true, 0.85);
        for _ in 0..count {
            tracker.lease_added(30);
        }
        tracker
    }

    #[test]
    fn test_expected_rate_bookkeeping() {
        let tracker = RenewalTracker::new(true, 0.85);
        tracker.lease_added(30);
        tracker.lease_added(30);
        // two instances renewing every 30s owe 4 renewals per minute
        assert_eq!(tracker.expected_per_min(), 4.0);
        assert_eq!(tracker.renewal_threshold(), 4); // ceil(4 * 0.85)

        tracker.lease_removed(30);
        tracker.lease_removed(30);
        tracker.lease_removed(30);
        assert_eq!(tracker.expected_per_min(), 0.0);
    }

    #[test]
    fn test_window_averages_observed_minutes_only() {
        let tracker = tracker_with_instances(5);
        for _ in 0..10 {
            tracker.record_renewal(at_minute(0));
        }
        // one minute observed: 10 renewals / 1 minute
        assert_eq!(tracker.renewals_per_min(at_minute(0)), 10.0);

        // four silent minutes drag the average down
        assert_eq!(tracker.renewals_per_min(at_minute(4)), 2.0);
    }

    #[test]
    fn test_old_buckets_fall_out_of_the_window() {
        let tracker = tracker_with_instances(1);
        for _ in 0..30 {
            tracker.record_renewal(at_minute(0));
        }
        assert!(tracker.renewals_per_min(at_minute(14)) > 0.0);
        assert_eq!(tracker.renewals_per_min(at_minute(15)), 0.0);
    }

    #[test]
    fn test_self_preservation_flips_when_renewals_collapse() {
        let tracker = tracker_with_instances(10);
        // 10 instances, 30s leases: 20 renewals owed per minute
        for minute in 0..3 {
            for _ in 0..20 {
                tracker.record_renewal(at_minute(minute));
            }
        }
        assert!(!tracker.self_preservation_active(at_minute(2)));

        // renewals stop for most instances
        for minute in 3..8 {
            for _ in 0..4 {
                tracker.record_renewal(at_minute(minute));
            }
        }
        assert!(tracker.self_preservation_active(at_minute(7)));
    }

    #[test]
    fn test_disabled_tracker_never_activates() {
        let tracker = RenewalTracker::new(false, 0.85);
        tracker.lease_added(30);
        assert!(!tracker.self_preservation_active(at_minute(5)));
    }

    #[test]
    fn test_empty_registry_never_activates() {
        let tracker = RenewalTracker::new(true, 0.85);
        assert!(!tracker.self_preservation_active(at_minute(5)));
    }
}

//! In-memory lease store
//!
//! Leases are bucketed by service name in a concurrent map. Every
//! operation is atomic per service bucket; readers never take a global
//! lock. Replicated writes go through the `apply_remote_*` methods,
//! which enforce last-writer-wins on the instance dirty timestamp.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use muster_types::{InstanceId, InstanceStatus, Lease, ServiceInstance, ServiceName};
use std::collections::HashMap;

/// Outcome of applying a replicated write to the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    /// Write applied to the local store
    Applied,
    /// Local copy was strictly newer, write dropped
    StaleDrop,
    /// No local lease to apply the write to
    Miss,
    /// Write failed validation and was rejected
    Invalid,
}

/// Concurrent map of service buckets, each holding the leases of one service
#[derive(Debug, Default)]
pub struct LeaseStore {
    services: DashMap<ServiceName, HashMap<InstanceId, Lease>>,
}

impl LeaseStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Insert or replace a lease for a local registration.
    ///
    /// Re-registration keeps the original registration timestamp and
    /// counts as a renewal. Returns the stored lease and the lease it
    /// replaced, if any.
    pub fn put(
        &self,
        instance: ServiceInstance,
        duration_seconds: u64,
        now: DateTime<Utc>,
    ) -> (Lease, Option<Lease>) {
        let service = instance.service.clone();
        let id = instance.id.clone();
        let mut lease = Lease::new(instance, duration_seconds, now);

        let mut bucket = self.services.entry(service).or_default();
        let previous = bucket.remove(&id);
        if let Some(prev) = &previous {
            lease.registered_at = prev.registered_at;
        }
        bucket.insert(id, lease.clone());
        (lease, previous)
    }

    /// Refresh the renewal timestamp of a lease.
    ///
    /// Returns the instance's dirty timestamp on success so callers can
    /// stamp the replicated renewal, or `None` when no lease exists.
    pub fn renew(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let mut bucket = self.services.get_mut(service)?;
        let lease = bucket.get_mut(id)?;
        lease.renew(now);
        Some(lease.instance.last_dirty_at)
    }

    /// Remove a lease for an explicit deregistration.
    pub fn cancel(&self, service: &ServiceName, id: &InstanceId) -> Option<Lease> {
        let removed = {
            let mut bucket = self.services.get_mut(service)?;
            bucket.remove(id)
        };
        if removed.is_some() {
            self.drop_bucket_if_empty(service);
        }
        removed
    }

    /// Override the reported status of an instance.
    pub fn update_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
        dirty_at: DateTime<Utc>,
    ) -> bool {
        let Some(mut bucket) = self.services.get_mut(service) else {
            return false;
        };
        let Some(lease) = bucket.get_mut(id) else {
            return false;
        };
        lease.instance.status = status;
        lease.instance.last_dirty_at = dirty_at;
        true
    }

    /// Atomically remove a lease if it is still expired at `now`.
    ///
    /// The expiry check runs under the bucket lock, so a renewal that
    /// raced in between candidate selection and removal wins. The
    /// returned lease carries its eviction timestamp.
    pub fn remove_if_expired(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        now: DateTime<Utc>,
        threshold_multiplier: f64,
    ) -> Option<Lease> {
        let removed = {
            let mut bucket = self.services.get_mut(service)?;
            let lease = bucket.get_mut(id)?;
            if !lease.is_expired(now, threshold_multiplier) {
                return None;
            }
            lease.mark_evicted(now);
            bucket.remove(id)
        };
        if removed.is_some() {
            self.drop_bucket_if_empty(service);
        }
        removed
    }

    /// Insert a lease pulled from a peer snapshot.
    ///
    /// The renewal clock restarts locally so a stale snapshot does not
    /// trigger a mass eviction right after startup. Existing leases are
    /// left untouched. Returns whether the lease was inserted.
    pub fn seed(&self, mut lease: Lease, now: DateTime<Utc>) -> bool {
        use std::collections::hash_map::Entry;

        let service = lease.instance.service.clone();
        let id = lease.instance.id.clone();
        let mut bucket = self.services.entry(service).or_default();
        match bucket.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                lease.last_renewed_at = now;
                lease.evicted_at = None;
                slot.insert(lease);
                true
            }
        }
    }

    /// Apply a replicated registration unless the local copy is newer.
    ///
    /// Returns the outcome and the lease that was replaced, if any.
    pub fn apply_remote_register(
        &self,
        instance: ServiceInstance,
        duration_seconds: u64,
        now: DateTime<Utc>,
    ) -> (RemoteApply, Option<Lease>) {
        let service = instance.service.clone();
        let id = instance.id.clone();

        let mut bucket = self.services.entry(service).or_default();
        if let Some(existing) = bucket.get(&id) {
            if existing.instance.last_dirty_at > instance.last_dirty_at {
                return (RemoteApply::StaleDrop, None);
            }
        }

        let mut lease = Lease::new(instance, duration_seconds, now);
        let previous = bucket.remove(&id);
        if let Some(prev) = &previous {
            lease.registered_at = prev.registered_at;
        }
        bucket.insert(id, lease);
        (RemoteApply::Applied, previous)
    }

    /// Apply a replicated renewal unless the local copy is newer.
    pub fn apply_remote_renew(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        dirty_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RemoteApply {
        let Some(mut bucket) = self.services.get_mut(service) else {
            return RemoteApply::Miss;
        };
        let Some(lease) = bucket.get_mut(id) else {
            return RemoteApply::Miss;
        };
        if lease.instance.last_dirty_at > dirty_at {
            return RemoteApply::StaleDrop;
        }
        lease.renew(now);
        RemoteApply::Applied
    }

    /// Apply a replicated cancellation unless the local copy is newer.
    ///
    /// Returns the outcome and the removed lease when applied.
    pub fn apply_remote_cancel(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        dirty_at: DateTime<Utc>,
    ) -> (RemoteApply, Option<Lease>) {
        let (outcome, removed) = {
            let Some(mut bucket) = self.services.get_mut(service) else {
                return (RemoteApply::Miss, None);
            };
            let Some(lease) = bucket.get(id) else {
                return (RemoteApply::Miss, None);
            };
            if lease.instance.last_dirty_at > dirty_at {
                (RemoteApply::StaleDrop, None)
            } else {
                (RemoteApply::Applied, bucket.remove(id))
            }
        };
        if removed.is_some() {
            self.drop_bucket_if_empty(service);
        }
        (outcome, removed)
    }

    /// Apply a replicated status override unless the local copy is newer.
    pub fn apply_remote_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
        dirty_at: DateTime<Utc>,
    ) -> RemoteApply {
        let Some(mut bucket) = self.services.get_mut(service) else {
            return RemoteApply::Miss;
        };
        let Some(lease) = bucket.get_mut(id) else {
            return RemoteApply::Miss;
        };
        if lease.instance.last_dirty_at > dirty_at {
            return RemoteApply::StaleDrop;
        }
        lease.instance.status = status;
        lease.instance.last_dirty_at = dirty_at;
        RemoteApply::Applied
    }

    /// Copy of one lease
    pub fn lease(&self, service: &ServiceName, id: &InstanceId) -> Option<Lease> {
        self.services.get(service)?.get(id).cloned()
    }

    /// Copies of all instances of one service
    pub fn instances(&self, service: &ServiceName) -> Vec<ServiceInstance> {
        match self.services.get(service) {
            Some(bucket) => bucket.values().map(|l| l.instance.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Copies of all instances grouped by service
    pub fn all_instances(&self) -> HashMap<ServiceName, Vec<ServiceInstance>> {
        self.services
            .iter()
            .map(|entry| {
                let instances = entry.value().values().map(|l| l.instance.clone()).collect();
                (entry.key().clone(), instances)
            })
            .collect()
    }

    /// Copies of every lease, used by the sweeper and the peer snapshot
    pub fn leases(&self) -> Vec<Lease> {
        self.services
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn instance_count(&self) -> usize {
        self.services.iter().map(|entry| entry.value().len()).sum()
    }

    fn drop_bucket_if_empty(&self, service: &ServiceName) {
        self.services.remove_if(service, |_, bucket| bucket.is_empty());
    }
}

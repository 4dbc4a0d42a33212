//! Read-only query cache
//!
//! Queries never touch the live lease store. They read an immutable
//! snapshot behind an atomic pointer; rebuilds assemble a fresh
//! snapshot off to the side and swap it in. Writers only flip a dirty
//! flag, so a slow rebuild never blocks registrations or renewals.

use crate::store::LeaseStore;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use muster_types::{ServiceInstance, ServiceName};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Immutable point-in-time view of the registry
#[derive(Debug)]
pub struct RegistrySnapshot {
    services: HashMap<ServiceName, Arc<[ServiceInstance]>>,
    /// When this snapshot was assembled
    pub built_at: DateTime<Utc>,
    /// Monotonic rebuild counter, starts at 0 for the empty snapshot
    pub version: u64,
}

impl RegistrySnapshot {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            services: HashMap::new(),
            built_at: now,
            version: 0,
        }
    }

    /// Instances of one service, if the snapshot knows it
    pub fn instances(&self, service: &ServiceName) -> Option<&Arc<[ServiceInstance]>> {
        self.services.get(service)
    }

    /// All services in the snapshot
    pub fn services(&self) -> &HashMap<ServiceName, Arc<[ServiceInstance]>> {
        &self.services
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn instance_count(&self) -> usize {
        self.services.values().map(|list| list.len()).sum()
    }
}

/// Swappable snapshot plus the dirty bookkeeping that drives rebuilds
#[derive(Debug)]
pub struct QueryCache {
    current: ArcSwap<RegistrySnapshot>,
    dirty: AtomicBool,
    pending_writes: AtomicUsize,
    burst_threshold: usize,
}

impl QueryCache {
    /// `burst_threshold` is the number of accumulated writes that asks
    /// for a rebuild ahead of the periodic schedule.
    pub fn new(burst_threshold: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::empty(Utc::now())),
            dirty: AtomicBool::new(false),
            pending_writes: AtomicUsize::new(0),
            burst_threshold,
        }
    }

    /// Current snapshot, shared with anyone else holding it
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Instances of one service from the current snapshot
    pub fn instances(&self, service: &ServiceName) -> Arc<[ServiceInstance]> {
        self.current
            .load()
            .instances(service)
            .cloned()
            .unwrap_or_else(|| Vec::new().into())
    }

    /// Note one write against the live store.
    ///
    /// Returns true when the accumulated writes crossed the burst
    /// threshold and the caller should nudge the rebuild loop.
    pub fn mark_dirty(&self) -> bool {
        self.dirty.store(true, Ordering::Release);
        let pending = self.pending_writes.fetch_add(1, Ordering::AcqRel) + 1;
        self.burst_threshold > 0 && pending % self.burst_threshold == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Assemble a fresh snapshot from the store and swap it in.
    pub fn rebuild(&self, store: &LeaseStore, now: DateTime<Utc>) -> Arc<RegistrySnapshot> {
        let services: HashMap<ServiceName, Arc<[ServiceInstance]>> = store
            .all_instances()
            .into_iter()
            .map(|(name, mut instances)| {
                instances.sort_by(|a, b| a.id.cmp(&b.id));
                (name, Arc::from(instances))
            })
            .collect();

        let snapshot = Arc::new(RegistrySnapshot {
            services,
            built_at: now,
            version: self.current.load().version + 1,
        });
        self.current.store(snapshot.clone());
        self.dirty.store(false, Ordering::Release);
        self.pending_writes.store(0, Ordering::Release);
        snapshot
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.current.load().built_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn store_with(ids: &[&str]) -> LeaseStore {
        let store = LeaseStore::new();
        for id in ids {
            let instance = ServiceInstance::new("orders", *id, "10.0.0.5", 8080);
            store.put(instance, 30, at(0));
        }
        store
    }

    #[test]
    fn test_queries_see_nothing_until_rebuild() {
        let cache = QueryCache::new(8);
        let store = store_with(&["orders-1"]);

        let service = ServiceName::new("orders");
        assert!(cache.instances(&service).is_empty());
        assert_eq!(cache.version(), 0);

        cache.rebuild(&store, at(5));
        let instances = cache.instances(&service);
        assert_eq!(instances.len(), 1);
        assert_eq!(cache.version(), 1);
        assert_eq!(cache.built_at(), at(5));
    }

    #[test]
    fn test_snapshot_is_immutable_across_store_writes() {
        let cache = QueryCache::new(8);
        let store = store_with(&["orders-1"]);
        cache.rebuild(&store, at(5));

        let held = cache.snapshot();
        store.put(ServiceInstance::new("orders", "orders-2", "10.0.0.6", 8080), 30, at(6));
        cache.rebuild(&store, at(7));

        // the old snapshot still answers with its own contents
        assert_eq!(held.instance_count(), 1);
        assert_eq!(cache.snapshot().instance_count(), 2);
        assert_eq!(cache.version(), 2);
    }

    #[test]
    fn test_burst_threshold_trips_every_n_writes() {
        let cache = QueryCache::new(3);
        assert!(!cache.mark_dirty());
        assert!(!cache.mark_dirty());
        assert!(cache.mark_dirty());
        assert!(cache.is_dirty());

        // counter resets on rebuild
        cache.rebuild(&LeaseStore::new(), at(0));
        assert!(!cache.is_dirty());
        assert!(!cache.mark_dirty());
    }

    #[test]
    fn test_rebuild_orders_instances_by_id() {
        let cache = QueryCache::new(8);
        let store = store_with(&["orders-3", "orders-1", "orders-2"]);
        cache.rebuild(&store, at(1));

        let ids: Vec<String> = cache
            .instances(&ServiceName::new("orders"))
            .iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, vec!["orders-1", "orders-2", "orders-3"]);
    }
}

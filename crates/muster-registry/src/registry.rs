//! Registry facade
//!
//! Single entry point for every mutation and query on a registry node.
//! Local writes go to the lease store, update the renewal bookkeeping,
//! flip the cache dirty flag and enqueue a replication event. Writes
//! arriving from peers go through [`Registry::apply_replicated`], which
//! resolves conflicts by dirty timestamp and never re-forwards.

use crate::cache::{QueryCache, RegistrySnapshot};
use crate::error::{RegistryError, Result};
use crate::store::{LeaseStore, RemoteApply};
use crate::sweeper::{plan_evictions, SweepOutcome};
use crate::tracker::RenewalTracker;
use chrono::{DateTime, Utc};
use muster_types::{
    InstanceId, InstanceStatus, Lease, NodeName, RegistryEvent, RegistryEventEnvelope,
    ReplicationAction, ReplicationEvent, ServiceInstance, ServiceName,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Tunables for a registry node
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Lease duration applied when a registration does not specify one
    pub lease_duration_seconds: u64,

    /// Grace multiplier on the lease duration before a lease expires
    pub eviction_threshold_multiplier: f64,

    /// Whether collapsing renewal rates suspend eviction
    pub self_preservation_enabled: bool,

    /// Fraction of the expected renewal rate that counts as healthy
    pub renewal_threshold_fraction: f64,

    /// Fraction of expired leases the sweeper may still evict while
    /// self-preservation is active
    pub eviction_cap_fraction: f64,

    /// Accumulated writes that ask for a cache rebuild ahead of schedule
    pub cache_burst_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_duration_seconds: muster_types::DEFAULT_LEASE_DURATION_SECONDS,
            eviction_threshold_multiplier: 3.0,
            self_preservation_enabled: true,
            renewal_threshold_fraction: 0.85,
            eviction_cap_fraction: 0.0,
            cache_burst_threshold: 8,
        }
    }
}

/// Operator-facing counters for one registry node
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub services: usize,
    pub instances: usize,
    pub renews_per_min: f64,
    pub expected_renews_per_min: f64,
    pub renewal_threshold: u64,
    pub self_preservation_active: bool,
    pub cache_version: u64,
    pub cache_built_at: DateTime<Utc>,
}

/// A single registry node's lease table and the machinery around it
#[derive(Debug)]
pub struct Registry {
    node: NodeName,
    config: RegistryConfig,
    store: LeaseStore,
    tracker: RenewalTracker,
    cache: QueryCache,
    replication_tx: Option<mpsc::Sender<ReplicationEvent>>,
    rebuild_tx: Option<mpsc::Sender<()>>,
    event_tx: broadcast::Sender<RegistryEventEnvelope>,
}

impl Registry {
    pub fn new(node: NodeName, config: RegistryConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            node,
            tracker: RenewalTracker::new(
                config.self_preservation_enabled,
                config.renewal_threshold_fraction,
            ),
            cache: QueryCache::new(config.cache_burst_threshold),
            store: LeaseStore::new(),
            config,
            replication_tx: None,
            rebuild_tx: None,
            event_tx,
        }
    }

    /// Attach the outbound replication queue. Local writes are enqueued
    /// onto it; a full queue drops the event with a warning.
    pub fn with_replication(mut self, tx: mpsc::Sender<ReplicationEvent>) -> Self {
        self.replication_tx = Some(tx);
        self
    }

    /// Attach the cache rebuild trigger nudged on write bursts.
    pub fn with_rebuild_trigger(mut self, tx: mpsc::Sender<()>) -> Self {
        self.rebuild_tx = Some(tx);
        self
    }

    pub fn node(&self) -> &NodeName {
        &self.node
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to lease lifecycle events on this node.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Register an instance under a fresh lease.
    ///
    /// Re-registration replaces the instance record, keeps the original
    /// registration time and restarts the renewal clock.
    pub fn register(
        &self,
        service: &ServiceName,
        mut instance: ServiceInstance,
        lease_duration_seconds: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Lease> {
        validate_registration(service, &instance)?;
        instance.last_dirty_at = now;

        let duration = lease_duration_seconds.unwrap_or(self.config.lease_duration_seconds);
        let (lease, previous) = self.store.put(instance, duration, now);
        if let Some(previous) = previous {
            self.tracker.lease_removed(previous.duration_seconds);
        }
        self.tracker.lease_added(duration);
        self.touch_cache();
        self.replicate(ReplicationEvent::register(
            self.node.clone(),
            lease.instance.clone(),
            duration,
        ));
        self.emit(RegistryEvent::InstanceRegistered {
            service: service.clone(),
            instance_id: lease.instance.id.clone(),
        });

        info!(
            service = %service,
            instance_id = %lease.instance.id,
            lease_duration_seconds = duration,
            "Registered instance"
        );
        Ok(lease)
    }

    /// Accept a heartbeat for a lease.
    pub fn renew(&self, service: &ServiceName, id: &InstanceId, now: DateTime<Utc>) -> Result<()> {
        let dirty_at = self
            .store
            .renew(service, id, now)
            .ok_or_else(|| RegistryError::unknown_lease(service, id))?;

        self.tracker.record_renewal(now);
        self.replicate(ReplicationEvent::renew(
            self.node.clone(),
            service.clone(),
            id.clone(),
            dirty_at,
        ));
        self.emit(RegistryEvent::LeaseRenewed {
            service: service.clone(),
            instance_id: id.clone(),
        });
        debug!(service = %service, instance_id = %id, "Renewed lease");
        Ok(())
    }

    /// Deregister an instance. Idempotent: returns whether a lease was
    /// actually removed.
    pub fn cancel(&self, service: &ServiceName, id: &InstanceId, now: DateTime<Utc>) -> bool {
        let Some(lease) = self.store.cancel(service, id) else {
            debug!(service = %service, instance_id = %id, "Cancel for unknown lease ignored");
            return false;
        };

        self.tracker.lease_removed(lease.duration_seconds);
        self.touch_cache();
        self.replicate(ReplicationEvent::cancel(
            self.node.clone(),
            service.clone(),
            id.clone(),
            now,
        ));
        self.emit(RegistryEvent::InstanceCancelled {
            service: service.clone(),
            instance_id: id.clone(),
        });
        info!(service = %service, instance_id = %id, "Cancelled lease");
        true
    }

    /// Override the reported status of a registered instance.
    pub fn update_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.store.update_status(service, id, status, now) {
            return Err(RegistryError::unknown_lease(service, id));
        }

        self.touch_cache();
        self.replicate(ReplicationEvent::status_update(
            self.node.clone(),
            service.clone(),
            id.clone(),
            status,
            now,
        ));
        self.emit(RegistryEvent::StatusChanged {
            service: service.clone(),
            instance_id: id.clone(),
            status,
        });
        info!(service = %service, instance_id = %id, status = %status, "Updated instance status");
        Ok(())
    }

    /// Instances of one service, served from the query cache.
    pub fn instances(&self, service: &ServiceName) -> Arc<[ServiceInstance]> {
        self.cache.instances(service)
    }

    /// Full registry view, served from the query cache.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.cache.snapshot()
    }

    /// Lease lookup against the live store, bypassing the cache.
    pub fn lease(&self, service: &ServiceName, id: &InstanceId) -> Option<Lease> {
        self.store.lease(service, id)
    }

    /// All live leases, for peers bootstrapping their registry.
    pub fn lease_snapshot(&self) -> Vec<Lease> {
        self.store.leases()
    }

    /// Whether eviction is currently held back.
    pub fn self_preservation_active(&self, now: DateTime<Utc>) -> bool {
        self.tracker.self_preservation_active(now)
    }

    pub fn cache_dirty(&self) -> bool {
        self.cache.is_dirty()
    }

    /// Rebuild the query cache from the live store.
    pub fn rebuild_cache(&self, now: DateTime<Utc>) -> Arc<RegistrySnapshot> {
        let snapshot = self.cache.rebuild(&self.store, now);
        self.emit(RegistryEvent::CacheRebuilt {
            version: snapshot.version,
            services: snapshot.service_count(),
            instances: snapshot.instance_count(),
        });
        debug!(
            version = snapshot.version,
            services = snapshot.service_count(),
            instances = snapshot.instance_count(),
            "Rebuilt query cache"
        );
        snapshot
    }

    /// One eviction pass over the lease table.
    ///
    /// Expired leases are removed oldest renewal first, and every
    /// eviction is replicated to peers as a cancellation. While
    /// self-preservation is active the pass evicts at most the
    /// configured fraction of the expired set.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome {
        let preservation = self.tracker.self_preservation_active(now);
        let leases = self.store.leases();
        let plan = plan_evictions(
            &leases,
            now,
            self.config.eviction_threshold_multiplier,
            preservation,
            self.config.eviction_cap_fraction,
        );

        let mut evicted = Vec::with_capacity(plan.victims.len());
        for (service, id) in plan.victims {
            // re-checked under the bucket lock; a renewal that raced in wins
            let Some(lease) = self.store.remove_if_expired(
                &service,
                &id,
                now,
                self.config.eviction_threshold_multiplier,
            ) else {
                continue;
            };

            self.tracker.lease_removed(lease.duration_seconds);
            self.replicate(ReplicationEvent::cancel(
                self.node.clone(),
                service.clone(),
                id.clone(),
                now,
            ));
            self.emit(RegistryEvent::LeaseEvicted {
                service: service.clone(),
                instance_id: id.clone(),
                last_renewed_at: lease.last_renewed_at,
            });
            warn!(
                service = %service,
                instance_id = %id,
                last_renewed_at = %lease.last_renewed_at,
                "Evicted expired lease"
            );
            evicted.push((service, id));
        }

        if !evicted.is_empty() {
            self.touch_cache();
        }

        let suppressed = plan.expired.saturating_sub(evicted.len());
        if suppressed > 0 {
            self.emit(RegistryEvent::EvictionSuppressed {
                expired: plan.expired,
                evicted: evicted.len(),
            });
            warn!(
                expired = plan.expired,
                evicted = evicted.len(),
                "Self-preservation held back expired leases"
            );
        }

        SweepOutcome {
            expired: plan.expired,
            evicted,
            suppressed,
        }
    }

    /// Apply a write replicated from a peer.
    ///
    /// Conflicts resolve by dirty timestamp: a local copy that is
    /// strictly newer wins and the event is dropped. Applied writes are
    /// never forwarded again.
    pub fn apply_replicated(&self, event: ReplicationEvent, now: DateTime<Utc>) -> RemoteApply {
        let origin = event.origin.clone();
        let kind = event.kind();
        let service = event.service().clone();
        let id = event.instance_id().clone();
        let dirty_at = event.dirty_at;

        // peers are trusted no further than clients
        if let ReplicationAction::Register { instance, .. } = &event.action {
            if let Err(err) = validate_registration(&service, instance) {
                warn!(
                    origin = %origin,
                    service = %service,
                    instance_id = %id,
                    error = %err,
                    "Rejected invalid replicated registration"
                );
                return RemoteApply::Invalid;
            }
        }

        let outcome = match event.action {
            ReplicationAction::Register {
                instance,
                lease_duration_seconds,
            } => {
                let (outcome, previous) =
                    self.store
                        .apply_remote_register(instance, lease_duration_seconds, now);
                if outcome == RemoteApply::Applied {
                    if let Some(previous) = previous {
                        self.tracker.lease_removed(previous.duration_seconds);
                    }
                    self.tracker.lease_added(lease_duration_seconds);
                    self.touch_cache();
                    self.emit(RegistryEvent::InstanceRegistered {
                        service: service.clone(),
                        instance_id: id.clone(),
                    });
                }
                outcome
            }
            ReplicationAction::Renew { .. } => {
                let outcome = self.store.apply_remote_renew(&service, &id, dirty_at, now);
                if outcome == RemoteApply::Applied {
                    self.tracker.record_renewal(now);
                }
                outcome
            }
            ReplicationAction::Cancel { .. } => {
                let (outcome, removed) = self.store.apply_remote_cancel(&service, &id, dirty_at);
                if let Some(removed) = removed {
                    self.tracker.lease_removed(removed.duration_seconds);
                    self.touch_cache();
                    self.emit(RegistryEvent::InstanceCancelled {
                        service: service.clone(),
                        instance_id: id.clone(),
                    });
                }
                outcome
            }
            ReplicationAction::StatusUpdate { status, .. } => {
                let outcome = self.store.apply_remote_status(&service, &id, status, dirty_at);
                if outcome == RemoteApply::Applied {
                    self.touch_cache();
                    self.emit(RegistryEvent::StatusChanged {
                        service: service.clone(),
                        instance_id: id.clone(),
                        status,
                    });
                }
                outcome
            }
        };

        match outcome {
            RemoteApply::Applied => {
                debug!(origin = %origin, kind, service = %service, instance_id = %id, "Applied replicated event")
            }
            RemoteApply::StaleDrop => {
                debug!(origin = %origin, kind, service = %service, instance_id = %id, "Dropped stale replicated event")
            }
            RemoteApply::Miss => {
                debug!(origin = %origin, kind, service = %service, instance_id = %id, "Replicated event missed local lease")
            }
            // rejected above, before touching the store
            RemoteApply::Invalid => {}
        }
        outcome
    }

    /// Seed the registry from a peer snapshot at startup.
    pub fn seed(&self, leases: Vec<Lease>, now: DateTime<Utc>) -> usize {
        let mut seeded = 0;
        for lease in leases {
            let duration = lease.duration_seconds;
            if self.store.seed(lease, now) {
                self.tracker.lease_added(duration);
                seeded += 1;
            }
        }
        if seeded > 0 {
            self.touch_cache();
        }
        debug!(seeded, "Inserted snapshot leases into local store");
        seeded
    }

    pub fn stats(&self, now: DateTime<Utc>) -> RegistryStats {
        RegistryStats {
            services: self.store.service_count(),
            instances: self.store.instance_count(),
            renews_per_min: self.tracker.renewals_per_min(now),
            expected_renews_per_min: self.tracker.expected_per_min(),
            renewal_threshold: self.tracker.renewal_threshold(),
            self_preservation_active: self.tracker.self_preservation_active(now),
            cache_version: self.cache.version(),
            cache_built_at: self.cache.built_at(),
        }
    }

    fn touch_cache(&self) {
        if self.cache.mark_dirty() {
            if let Some(tx) = &self.rebuild_tx {
                let _ = tx.try_send(());
            }
        }
    }

    fn replicate(&self, event: ReplicationEvent) {
        let Some(tx) = &self.replication_tx else {
            return;
        };
        if let Err(err) = tx.try_send(event) {
            warn!(error = %err, "Replication queue full, dropping event");
        }
    }

    fn emit(&self, event: RegistryEvent) {
        let _ = self
            .event_tx
            .send(RegistryEventEnvelope::new(self.node.clone(), event));
    }
}

fn validate_registration(service: &ServiceName, instance: &ServiceInstance) -> Result<()> {
    if service.is_empty() {
        return Err(RegistryError::InvalidInstance(
            "service name must not be empty".to_string(),
        ));
    }
    if instance.id.is_empty() {
        return Err(RegistryError::InvalidInstance(
            "instance id must not be empty".to_string(),
        ));
    }
    if instance.host.is_empty() {
        return Err(RegistryError::InvalidInstance(
            "host must not be empty".to_string(),
        ));
    }
    if instance.port == 0 {
        return Err(RegistryError::InvalidInstance(
            "port must not be zero".to_string(),
        ));
    }
    if instance.service != *service {
        return Err(RegistryError::InvalidInstance(format!(
            "instance service '{}' does not match '{}'",
            instance.service, service
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn registry() -> Registry {
        Registry::new(
            NodeName::new("n1"),
            RegistryConfig {
                eviction_threshold_multiplier: 2.0,
                ..RegistryConfig::default()
            },
        )
    }

    fn orders(id: &str) -> (ServiceName, ServiceInstance) {
        let service = ServiceName::new("orders");
        let instance = ServiceInstance::new("orders", id, "10.0.0.5", 8080);
        (service, instance)
    }

    #[tokio::test]
    async fn test_registration_appears_after_cache_rebuild() {
        let registry = registry();
        let (service, instance) = orders("orders-1");

        registry.register(&service, instance, None, at(0)).unwrap();
        assert!(registry.instances(&service).is_empty());

        registry.rebuild_cache(at(1));
        let instances = registry.instances(&service);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, InstanceId::new("orders-1"));
    }

    #[tokio::test]
    async fn test_registration_rejects_malformed_instances() {
        let registry = registry();
        let service = ServiceName::new("orders");

        let no_host = ServiceInstance::new("orders", "orders-1", "", 8080);
        let err = registry.register(&service, no_host, None, at(0)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInstance(_)));

        let wrong_service = ServiceInstance::new("payments", "p-1", "10.0.0.5", 8080);
        let err = registry
            .register(&service, wrong_service, None, at(0))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInstance(_)));

        let no_port = ServiceInstance::new("orders", "orders-1", "10.0.0.5", 0);
        assert!(registry.register(&service, no_port, None, at(0)).is_err());
    }

    #[tokio::test]
    async fn test_renew_unknown_lease_is_an_error() {
        let registry = registry();
        let err = registry
            .renew(&ServiceName::new("orders"), &InstanceId::new("ghost"), at(0))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownLease { .. }));
        // the failed renewal leaves nothing behind
        assert!(registry
            .lease(&ServiceName::new("orders"), &InstanceId::new("ghost"))
            .is_none());
    }

    #[tokio::test]
    async fn test_unrenewed_lease_gone_from_queries_after_sweep() {
        let registry = Registry::new(
            NodeName::new("n1"),
            RegistryConfig {
                eviction_threshold_multiplier: 2.0,
                self_preservation_enabled: false,
                ..RegistryConfig::default()
            },
        );
        let (service, instance) = orders("A1");
        registry.register(&service, instance, Some(30), at(0)).unwrap();
        registry.rebuild_cache(at(1));
        assert_eq!(registry.instances(&service).len(), 1);

        // 30s lease with a 2x threshold survives exactly 60s of silence
        assert_eq!(registry.sweep(at(60)).expired, 0);

        let outcome = registry.sweep(at(61));
        assert_eq!(outcome.expired, 1);
        assert_eq!(outcome.evicted_count(), 1);

        registry.rebuild_cache(at(62));
        assert!(registry.instances(&service).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let registry = registry();
        let (service, instance) = orders("orders-1");
        registry.register(&service, instance, None, at(0)).unwrap();

        assert!(registry.cancel(&service, &InstanceId::new("orders-1"), at(1)));
        assert!(!registry.cancel(&service, &InstanceId::new("orders-1"), at(2)));
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_leases() {
        let registry = Registry::new(
            NodeName::new("n1"),
            RegistryConfig {
                eviction_threshold_multiplier: 2.0,
                self_preservation_enabled: false,
                ..RegistryConfig::default()
            },
        );
        let (service, a) = orders("orders-a");
        let (_, b) = orders("orders-b");
        registry.register(&service, a, None, at(0)).unwrap();
        registry.register(&service, b, None, at(0)).unwrap();

        // keep b alive, let a rot
        registry
            .renew(&service, &InstanceId::new("orders-b"), at(100))
            .unwrap();

        let outcome = registry.sweep(at(150));
        assert_eq!(outcome.expired, 1);
        assert_eq!(
            outcome.evicted,
            vec![(service.clone(), InstanceId::new("orders-a"))]
        );
        assert_eq!(outcome.suppressed, 0);

        registry.rebuild_cache(at(151));
        let left = registry.instances(&service);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, InstanceId::new("orders-b"));
    }

    #[tokio::test]
    async fn test_sweep_suppressed_while_self_preserving() {
        let registry = Registry::new(
            NodeName::new("n1"),
            RegistryConfig {
                eviction_threshold_multiplier: 2.0,
                self_preservation_enabled: true,
                ..RegistryConfig::default()
            },
        );
        let service = ServiceName::new("orders");
        for i in 0..10 {
            let instance = ServiceInstance::new("orders", format!("i{i}"), "10.0.0.5", 8080);
            registry.register(&service, instance, None, at(0)).unwrap();
        }
        // healthy renewal traffic, then silence
        for minute in 0..3 {
            for i in 0..10 {
                registry
                    .renew(&service, &InstanceId::new(format!("i{i}")), at(minute * 60 + 20))
                    .unwrap();
                registry
                    .renew(&service, &InstanceId::new(format!("i{i}")), at(minute * 60 + 50))
                    .unwrap();
            }
        }

        let outcome = registry.sweep(at(600));
        assert_eq!(outcome.expired, 10);
        assert!(outcome.evicted.is_empty());
        assert_eq!(outcome.suppressed, 10);
        assert!(registry.self_preservation_active(at(600)));
        // leases are still queryable
        registry.rebuild_cache(at(601));
        assert_eq!(registry.instances(&service).len(), 10);
    }

    #[tokio::test]
    async fn test_writes_enqueue_replication_events() {
        let (tx, mut rx) = mpsc::channel(16);
        let registry = Registry::new(NodeName::new("n1"), RegistryConfig::default())
            .with_replication(tx);
        let (service, instance) = orders("orders-1");

        registry.register(&service, instance, None, at(0)).unwrap();
        registry
            .renew(&service, &InstanceId::new("orders-1"), at(10))
            .unwrap();
        registry
            .update_status(
                &service,
                &InstanceId::new("orders-1"),
                InstanceStatus::OutOfService,
                at(20),
            )
            .unwrap();
        registry.cancel(&service, &InstanceId::new("orders-1"), at(30));

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["register", "renew", "status_update", "cancel"]);
    }

    #[tokio::test]
    async fn test_replicated_writes_converge_between_nodes() {
        let (tx, mut rx) = mpsc::channel(64);
        let n1 = Registry::new(NodeName::new("n1"), RegistryConfig::default())
            .with_replication(tx);
        let n2 = Registry::new(NodeName::new("n2"), RegistryConfig::default());

        let (service, instance) = orders("orders-1");
        n1.register(&service, instance, None, at(0)).unwrap();
        n1.update_status(
            &service,
            &InstanceId::new("orders-1"),
            InstanceStatus::OutOfService,
            at(5),
        )
        .unwrap();

        while let Ok(event) = rx.try_recv() {
            n2.apply_replicated(event, at(6));
        }

        n2.rebuild_cache(at(7));
        let instances = n2.instances(&service);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].status, InstanceStatus::OutOfService);
    }

    #[tokio::test]
    async fn test_out_of_order_replication_converges_on_newest_write() {
        let n2 = Registry::new(NodeName::new("n2"), RegistryConfig::default());
        let service = ServiceName::new("orders");

        let mut newer = ServiceInstance::new("orders", "orders-1", "10.0.0.9", 8080);
        newer.last_dirty_at = at(50);
        let mut older = ServiceInstance::new("orders", "orders-1", "10.0.0.5", 8080);
        older.last_dirty_at = at(10);

        // the newer write arrives first
        n2.apply_replicated(
            ReplicationEvent::register(NodeName::new("n1"), newer, 30),
            at(60),
        );
        let outcome = n2.apply_replicated(
            ReplicationEvent::register(NodeName::new("n1"), older, 30),
            at(61),
        );
        assert_eq!(outcome, RemoteApply::StaleDrop);

        let lease = n2
            .lease(&service, &InstanceId::new("orders-1"))
            .unwrap();
        assert_eq!(lease.instance.host, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_replicated_register_is_validated_like_a_local_one() {
        let n2 = Registry::new(NodeName::new("n2"), RegistryConfig::default());
        let service = ServiceName::new("orders");

        let no_host = ServiceInstance::new("orders", "orders-1", "", 8080);
        let outcome = n2.apply_replicated(
            ReplicationEvent::register(NodeName::new("n1"), no_host, 30),
            at(0),
        );
        assert_eq!(outcome, RemoteApply::Invalid);
        assert!(n2.lease(&service, &InstanceId::new("orders-1")).is_none());

        let no_port = ServiceInstance::new("orders", "orders-2", "10.0.0.5", 0);
        let outcome = n2.apply_replicated(
            ReplicationEvent::register(NodeName::new("n1"), no_port, 30),
            at(0),
        );
        assert_eq!(outcome, RemoteApply::Invalid);
        assert!(n2.lease(&service, &InstanceId::new("orders-2")).is_none());
    }

    #[tokio::test]
    async fn test_replicated_cancel_loses_to_newer_register() {
        let n2 = Registry::new(NodeName::new("n2"), RegistryConfig::default());
        let service = ServiceName::new("orders");

        let mut instance = ServiceInstance::new("orders", "orders-1", "10.0.0.5", 8080);
        instance.last_dirty_at = at(100);
        n2.apply_replicated(
            ReplicationEvent::register(NodeName::new("n1"), instance, 30),
            at(100),
        );

        let outcome = n2.apply_replicated(
            ReplicationEvent::cancel(
                NodeName::new("n3"),
                service.clone(),
                InstanceId::new("orders-1"),
                at(40),
            ),
            at(101),
        );
        assert_eq!(outcome, RemoteApply::StaleDrop);
        assert!(n2.lease(&service, &InstanceId::new("orders-1")).is_some());
    }

    #[tokio::test]
    async fn test_write_burst_nudges_the_rebuild_trigger() {
        let (tx, mut rx) = mpsc::channel(4);
        let registry = Registry::new(
            NodeName::new("n1"),
            RegistryConfig {
                cache_burst_threshold: 3,
                ..RegistryConfig::default()
            },
        )
        .with_rebuild_trigger(tx);

        let service = ServiceName::new("orders");
        for i in 0..3 {
            let instance = ServiceInstance::new("orders", format!("i{i}"), "10.0.0.5", 8080);
            registry.register(&service, instance, None, at(i)).unwrap();
        }
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_seed_populates_store_and_restarts_renewal_clock() {
        let n1 = registry();
        let (service, a) = orders("orders-a");
        let (_, b) = orders("orders-b");
        n1.register(&service, a, None, at(0)).unwrap();
        n1.register(&service, b, None, at(0)).unwrap();

        let n2 = registry();
        let seeded = n2.seed(n1.lease_snapshot(), at(500));
        assert_eq!(seeded, 2);

        // seeded leases are fresh, not instantly expired
        let outcome = n2.sweep(at(510));
        assert_eq!(outcome.expired, 0);

        n2.rebuild_cache(at(511));
        assert_eq!(n2.instances(&service).len(), 2);
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_broadcast() {
        let registry = registry();
        let mut events = registry.subscribe();
        let (service, instance) = orders("orders-1");

        registry.register(&service, instance, None, at(0)).unwrap();
        registry.cancel(&service, &InstanceId::new("orders-1"), at(1));

        let first = events.try_recv().unwrap();
        assert!(matches!(first.event, RegistryEvent::InstanceRegistered { .. }));
        let second = events.try_recv().unwrap();
        assert!(matches!(second.event, RegistryEvent::InstanceCancelled { .. }));
    }
}

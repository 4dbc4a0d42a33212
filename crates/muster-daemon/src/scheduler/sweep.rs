//! Eviction and cache rebuild loops

use muster_registry::Registry;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration};

/// Scheduler state
pub struct Scheduler {
    registry: Arc<Registry>,
    eviction_interval: Duration,
    rebuild_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        registry: Arc<Registry>,
        eviction_interval: Duration,
        rebuild_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            eviction_interval,
            rebuild_interval,
            running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the scheduler background tasks.
    ///
    /// `rebuild_rx` carries rebuild nudges from the write path; the
    /// cache loop also wakes on its own interval.
    pub async fn start(self: Arc<Self>, mut rebuild_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!("Scheduler started");

        // Spawn eviction sweep loop
        let sweep_scheduler = self.clone();
        let sweep_handle = tokio::spawn(async move {
            let mut interval = interval(sweep_scheduler.eviction_interval);

            loop {
                interval.tick().await;

                let running = sweep_scheduler.running.read().await;
                if !*running {
                    break;
                }

                let outcome = sweep_scheduler.registry.sweep(chrono::Utc::now());
                if outcome.expired > 0 {
                    tracing::debug!(
                        expired = outcome.expired,
                        evicted = outcome.evicted_count(),
                        suppressed = outcome.suppressed,
                        "Eviction sweep complete"
                    );
                }
            }
        });

        // Spawn cache rebuild loop
        let cache_scheduler = self.clone();
        let cache_handle = tokio::spawn(async move {
            let mut interval = interval(cache_scheduler.rebuild_interval);

            loop {
                // the periodic tick always rebuilds so cache age stays
                // bounded; only the write-burst nudge is dirty-gated
                let forced = tokio::select! {
                    _ = interval.tick() => true,
                    Some(_) = rebuild_rx.recv() => false,
                    else => break,
                };

                let running = cache_scheduler.running.read().await;
                if !*running {
                    break;
                }

                if forced || cache_scheduler.registry.cache_dirty() {
                    cache_scheduler.registry.rebuild_cache(chrono::Utc::now());
                }
            }
        });

        // Wait for shutdown
        tokio::select! {
            _ = sweep_handle => {}
            _ = cache_handle => {}
        }

        tracing::info!("Scheduler stopped");
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_registry::RegistryConfig;
    use muster_types::{NodeName, ServiceInstance, ServiceName};

    #[tokio::test]
    async fn test_interval_tick_rebuilds_clean_cache() {
        let registry = Arc::new(Registry::new(
            NodeName::new("n1"),
            RegistryConfig::default(),
        ));
        let scheduler = Scheduler::new(
            registry.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(20),
        );

        let (_rebuild_tx, rebuild_rx) = mpsc::channel(4);
        let handle = tokio::spawn(scheduler.clone().start(rebuild_rx));

        // no writes at all: the cache stays clean, yet the periodic
        // tick keeps publishing fresh snapshots so cache age is bounded
        for _ in 0..100 {
            if registry.snapshot().version >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!registry.cache_dirty());
        assert!(registry.snapshot().version >= 2);

        scheduler.stop().await;
        handle.abort();
    }

    #[tokio::test]
    async fn test_rebuild_nudge_refreshes_dirty_cache() {
        let registry = Arc::new(Registry::new(
            NodeName::new("n1"),
            RegistryConfig::default(),
        ));
        let scheduler = Scheduler::new(
            registry.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );

        let (rebuild_tx, rebuild_rx) = mpsc::channel(4);
        let handle = tokio::spawn(scheduler.clone().start(rebuild_rx));

        let service = ServiceName::new("orders");
        let instance = ServiceInstance::new("orders", "orders-1", "10.0.0.5", 8080);
        registry
            .register(&service, instance, None, chrono::Utc::now())
            .unwrap();
        assert!(registry.cache_dirty());

        rebuild_tx.send(()).await.unwrap();
        for _ in 0..50 {
            if !registry.cache_dirty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!registry.cache_dirty());
        assert_eq!(registry.instances(&service).len(), 1);

        scheduler.stop().await;
        rebuild_tx.send(()).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}

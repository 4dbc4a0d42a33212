//! Event types for registry observability
//!
//! Events provide a unified stream of lease lifecycle activity on a
//! registry node. They are broadcast in-process; consumers that fall
//! behind miss events rather than blocking writers.

use crate::{InstanceId, InstanceStatus, NodeName, ServiceName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all registry events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Node the event was observed on
    pub node: NodeName,

    /// Event severity
    pub severity: EventSeverity,

    /// The actual event
    pub event: RegistryEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level event
    Debug,
    /// Informational event
    Info,
    /// Warning event
    Warning,
    /// Error event
    Error,
}

/// Registry lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// Instance registered or re-registered
    InstanceRegistered {
        service: ServiceName,
        instance_id: InstanceId,
    },

    /// Heartbeat renewal accepted
    LeaseRenewed {
        service: ServiceName,
        instance_id: InstanceId,
    },

    /// Instance deregistered explicitly
    InstanceCancelled {
        service: ServiceName,
        instance_id: InstanceId,
    },

    /// Instance status overridden
    StatusChanged {
        service: ServiceName,
        instance_id: InstanceId,
        status: InstanceStatus,
    },

    /// Expired lease removed by the sweeper
    LeaseEvicted {
        service: ServiceName,
        instance_id: InstanceId,
        last_renewed_at: DateTime<Utc>,
    },

    /// Self-preservation held back some or all expired leases
    EvictionSuppressed {
        expired: usize,
        evicted: usize,
    },

    /// Read cache rebuilt from the live store
    CacheRebuilt {
        version: u64,
        services: usize,
        instances: usize,
    },
}

impl RegistryEventEnvelope {
    /// Create a new event envelope
    pub fn new(node: NodeName, event: RegistryEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            node,
            severity: Self::infer_severity(&event),
            event,
        }
    }

    /// Infer severity from event type
    fn infer_severity(event: &RegistryEvent) -> EventSeverity {
        match event {
            RegistryEvent::LeaseEvicted { .. } | RegistryEvent::EvictionSuppressed { .. } => {
                EventSeverity::Warning
            }

            RegistryEvent::LeaseRenewed { .. } | RegistryEvent::CacheRebuilt { .. } => {
                EventSeverity::Debug
            }

            _ => EventSeverity::Info,
        }
    }
}

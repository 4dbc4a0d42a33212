//! Replication event types
//!
//! Every local write to a registry node is forwarded to its peers as a
//! ReplicationEvent. The `dirty_at` timestamp carries the writer's
//! last-dirty time and decides conflicts: the newer write wins, ties go
//! to the incoming event.

use crate::{InstanceId, InstanceStatus, NodeName, ServiceInstance, ServiceName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single replicated write, forwarded from the node that accepted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    /// Node that accepted the original client write
    pub origin: NodeName,

    /// Last-dirty timestamp of the write, used for conflict resolution
    pub dirty_at: DateTime<Utc>,

    /// The write itself
    pub action: ReplicationAction,
}

impl ReplicationEvent {
    pub fn register(origin: NodeName, instance: ServiceInstance, lease_duration_seconds: u64) -> Self {
        Self {
            origin,
            dirty_at: instance.last_dirty_at,
            action: ReplicationAction::Register {
                instance,
                lease_duration_seconds,
            },
        }
    }

    pub fn renew(
        origin: NodeName,
        service: ServiceName,
        instance_id: InstanceId,
        dirty_at: DateTime<Utc>,
    ) -> Self {
        Self {
            origin,
            dirty_at,
            action: ReplicationAction::Renew {
                service,
                instance_id,
            },
        }
    }

    pub fn cancel(
        origin: NodeName,
        service: ServiceName,
        instance_id: InstanceId,
        dirty_at: DateTime<Utc>,
    ) -> Self {
        Self {
            origin,
            dirty_at,
            action: ReplicationAction::Cancel {
                service,
                instance_id,
            },
        }
    }

    pub fn status_update(
        origin: NodeName,
        service: ServiceName,
        instance_id: InstanceId,
        status: InstanceStatus,
        dirty_at: DateTime<Utc>,
    ) -> Self {
        Self {
            origin,
            dirty_at,
            action: ReplicationAction::StatusUpdate {
                service,
                instance_id,
                status,
            },
        }
    }

    /// Service the event applies to
    pub fn service(&self) -> &ServiceName {
        match &self.action {
            ReplicationAction::Register { instance, .. } => &instance.service,
            ReplicationAction::Renew { service, .. } => service,
            ReplicationAction::Cancel { service, .. } => service,
            ReplicationAction::StatusUpdate { service, .. } => service,
        }
    }

    /// Instance the event applies to
    pub fn instance_id(&self) -> &InstanceId {
        match &self.action {
            ReplicationAction::Register { instance, .. } => &instance.id,
            ReplicationAction::Renew { instance_id, .. } => instance_id,
            ReplicationAction::Cancel { instance_id, .. } => instance_id,
            ReplicationAction::StatusUpdate { instance_id, .. } => instance_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.action {
            ReplicationAction::Register { .. } => "register",
            ReplicationAction::Renew { .. } => "renew",
            ReplicationAction::Cancel { .. } => "cancel",
            ReplicationAction::StatusUpdate { .. } => "status_update",
        }
    }
}

/// The write carried by a replication event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplicationAction {
    /// A new or re-registered instance together with its lease duration
    Register {
        instance: ServiceInstance,
        lease_duration_seconds: u64,
    },

    /// A heartbeat renewal
    Renew {
        service: ServiceName,
        instance_id: InstanceId,
    },

    /// An explicit deregistration or an eviction
    Cancel {
        service: ServiceName,
        instance_id: InstanceId,
    },

    /// A status override for a registered instance
    StatusUpdate {
        service: ServiceName,
        instance_id: InstanceId,
        status: InstanceStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_event_carries_instance_dirty_time() {
        let instance = ServiceInstance::new("orders", "orders-1", "10.0.0.5", 8080);
        let dirty = instance.last_dirty_at;
        let event = ReplicationEvent::register(NodeName::new("n1"), instance, 30);
        assert_eq!(event.dirty_at, dirty);
        assert_eq!(event.kind(), "register");
        assert_eq!(event.service(), &ServiceName::new("orders"));
    }

    #[test]
    fn test_action_wire_format_is_tagged() {
        let event = ReplicationEvent::cancel(
            NodeName::new("n1"),
            ServiceName::new("orders"),
            InstanceId::new("orders-1"),
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"]["kind"], "cancel");
        assert_eq!(json["action"]["service"], "orders");
        assert_eq!(json["origin"], "n1");

        let back: ReplicationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_status_update_round_trip() {
        let event = ReplicationEvent::status_update(
            NodeName::new("n2"),
            ServiceName::new("orders"),
            InstanceId::new("orders-1"),
            InstanceStatus::OutOfService,
            Utc::now(),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ReplicationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "status_update");
        assert_eq!(back, event);
    }
}

//! muster-types: Core types for the muster service discovery registry.
//!
//! This crate defines the shared vocabulary used across the muster
//! workspace: identifiers, service instances, leases, replication
//! events, and the observability event envelope.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod events;
pub mod ids;
pub mod instance;
pub mod lease;
pub mod replication;

pub use events::{EventSeverity, RegistryEvent, RegistryEventEnvelope};
pub use ids::{InstanceId, NodeName, ServiceName};
pub use instance::{InstanceStatus, Scheme, ServiceInstance};
pub use lease::{Lease, DEFAULT_LEASE_DURATION_SECONDS};
pub use replication::{ReplicationAction, ReplicationEvent};

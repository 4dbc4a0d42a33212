//! Registry error types

use muster_types::{InstanceId, ServiceName};
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown lease: {service}/{instance_id}")]
    UnknownLease {
        service: ServiceName,
        instance_id: InstanceId,
    },

    #[error("Invalid instance: {0}")]
    InvalidInstance(String),
}

impl RegistryError {
    pub fn unknown_lease(service: &ServiceName, instance_id: &InstanceId) -> Self {
        Self::UnknownLease {
            service: service.clone(),
            instance_id: instance_id.clone(),
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

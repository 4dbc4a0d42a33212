//! Service instance types
//!
//! A ServiceInstance is one addressable copy of a service, registered
//! under its ServiceName and identified by its InstanceId.

use crate::{InstanceId, ServiceName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A registered copy of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance identifier within the service
    pub id: InstanceId,

    /// Service this instance belongs to
    pub service: ServiceName,

    /// Host or IP address the instance is reachable at
    pub host: String,

    /// Port the instance listens on
    pub port: u16,

    /// URL scheme clients should use
    #[serde(default)]
    pub scheme: Scheme,

    /// Reported lifecycle status
    #[serde(default)]
    pub status: InstanceStatus,

    /// Free-form key/value metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Last time the instance record was mutated, used for
    /// last-writer-wins conflict resolution between registry nodes
    #[serde(default = "Utc::now")]
    pub last_dirty_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn new(
        service: impl Into<ServiceName>,
        id: impl Into<InstanceId>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            host: host.into(),
            port,
            scheme: Scheme::default(),
            status: InstanceStatus::default(),
            metadata: HashMap::new(),
            last_dirty_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Base URL clients use to reach this instance
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

/// URL scheme an instance is served over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::Http
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instance lifecycle status as reported by the instance itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Instance is starting up and not ready for traffic
    Starting,

    /// Instance is serving traffic
    Up,

    /// Instance is down
    Down,

    /// Instance was taken out of rotation by an operator
    OutOfService,

    /// Status has not been reported
    Unknown,
}

impl InstanceStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, InstanceStatus::Up)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl Default for InstanceStatus {
    fn default() -> Self {
        InstanceStatus::Up
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let instance = ServiceInstance::new("orders", "orders-1", "10.0.0.5", 8080);
        assert_eq!(instance.base_url(), "http://10.0.0.5:8080");

        let secure = instance.with_scheme(Scheme::Https);
        assert_eq!(secure.base_url(), "https://10.0.0.5:8080");
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&InstanceStatus::OutOfService).unwrap();
        assert_eq!(json, "\"OUT_OF_SERVICE\"");

        let status: InstanceStatus = serde_json::from_str("\"UP\"").unwrap();
        assert!(status.is_up());
    }

    #[test]
    fn test_instance_defaults_on_deserialize() {
        let json = r#"{"id":"orders-1","service":"orders","host":"10.0.0.5","port":8080}"#;
        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.scheme, Scheme::Http);
        assert_eq!(instance.status, InstanceStatus::Up);
        assert!(instance.metadata.is_empty());
    }
}

//! Configuration for musterd

use muster_registry::RegistryConfig;
use muster_replication::ReplicationConfig;
use muster_types::NodeName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Node identity
    #[serde(default)]
    pub node: NodeConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Lease and eviction configuration
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Query cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Peer replication configuration
    #[serde(default)]
    pub replication: ReplicationSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name this node reports as the origin of its writes
    #[serde(default = "default_node_name")]
    pub name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8761".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Lease and eviction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Lease duration granted when a registration does not ask for one
    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: u64,

    /// Seconds between eviction sweeps
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_seconds: u64,

    /// Grace multiplier applied to lease durations before expiry
    #[serde(default = "default_eviction_threshold_multiplier")]
    pub eviction_threshold_multiplier: f64,

    /// Suspend eviction when the renewal rate collapses
    #[serde(default = "default_true")]
    pub self_preservation_enabled: bool,

    /// Fraction of the expected renewal rate that still counts as healthy
    #[serde(default = "default_renewal_threshold_fraction")]
    pub renewal_threshold_fraction: f64,

    /// Fraction of expired leases evictable while self-preservation is active
    #[serde(default)]
    pub eviction_cap_fraction: f64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            lease_duration_seconds: default_lease_duration(),
            eviction_interval_seconds: default_eviction_interval(),
            eviction_threshold_multiplier: default_eviction_threshold_multiplier(),
            self_preservation_enabled: true,
            renewal_threshold_fraction: default_renewal_threshold_fraction(),
            eviction_cap_fraction: 0.0,
        }
    }
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds between periodic cache rebuilds
    #[serde(default = "default_cache_rebuild_interval")]
    pub rebuild_interval_seconds: u64,

    /// Writes accumulated within a rebuild interval that force an early rebuild
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            rebuild_interval_seconds: default_cache_rebuild_interval(),
            burst_threshold: default_burst_threshold(),
        }
    }
}

/// Peer replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Base URLs of the other registry nodes
    #[serde(default)]
    pub peers: Vec<String>,

    /// Capacity of the inbound replication queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of each per-peer delivery queue
    #[serde(default = "default_peer_queue_capacity")]
    pub peer_queue_capacity: usize,

    /// Timeout for one HTTP request to a peer, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Delivery attempts per event before it is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry backoff in milliseconds, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Pull a registry snapshot from a peer before serving traffic
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            queue_capacity: default_queue_capacity(),
            peer_queue_capacity: default_peer_queue_capacity(),
            request_timeout_seconds: default_request_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sync_on_startup: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_node_name() -> String {
    "muster-1".to_string()
}

fn default_lease_duration() -> u64 {
    30
}

fn default_eviction_interval() -> u64 {
    60
}

fn default_eviction_threshold_multiplier() -> f64 {
    3.0
}

fn default_renewal_threshold_fraction() -> f64 {
    0.85
}

fn default_cache_rebuild_interval() -> u64 {
    30
}

fn default_burst_threshold() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_peer_queue_capacity() -> usize {
    256
}

fn default_request_timeout() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, and
    /// MUSTER__-prefixed environment variables, in that order.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MUSTER")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn node_name(&self) -> NodeName {
        NodeName::new(self.node.name.clone())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            lease_duration_seconds: self.registry.lease_duration_seconds,
            eviction_threshold_multiplier: self.registry.eviction_threshold_multiplier,
            self_preservation_enabled: self.registry.self_preservation_enabled,
            renewal_threshold_fraction: self.registry.renewal_threshold_fraction,
            eviction_cap_fraction: self.registry.eviction_cap_fraction,
            cache_burst_threshold: self.cache.burst_threshold,
        }
    }

    pub fn replication_config(&self) -> ReplicationConfig {
        ReplicationConfig {
            peers: self.replication.peers.clone(),
            queue_capacity: self.replication.queue_capacity,
            peer_queue_capacity: self.replication.peer_queue_capacity,
            request_timeout: Duration::from_secs(self.replication.request_timeout_seconds),
            max_attempts: self.replication.max_attempts,
            retry_backoff: Duration::from_millis(self.replication.retry_backoff_ms),
        }
    }
}

//! Cluster subsystem configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default listen port for the inter-node transport.
pub const DEFAULT_CLUSTER_PORT: u16 = 14369;

/// Default member keepalive lease, in seconds.
pub const DEFAULT_ALIVE_TTL_SECS: u64 = 3;

/// Cluster subsystem configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Host advertised to peers in the member directory.
    pub host: String,
    /// Listen port for the inter-node transport. `0` picks an ephemeral port;
    /// the bound port is the one advertised.
    pub port: u16,
    /// Member keepalive lease, in seconds. Keys are refreshed at half this.
    pub alive_ttl_secs: u64,
    /// Outbound circuit-breaker tuning.
    pub breaker: BreakerConfig,
    /// Coordination-store endpoints.
    pub etcd: EtcdConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CLUSTER_PORT,
            alive_ttl_secs: DEFAULT_ALIVE_TTL_SECS,
            breaker: BreakerConfig::default(),
            etcd: EtcdConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Member keepalive lease as a [`Duration`].
    pub fn alive_ttl(&self) -> Duration {
        Duration::from_secs(self.alive_ttl_secs.max(1))
    }

    /// Set the advertised host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the transport listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Tuning for the outbound-call circuit breaker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures required before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe, in seconds.
    pub open_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_secs: 30,
        }
    }
}

impl BreakerConfig {
    /// Open window as a [`Duration`].
    pub fn open_window(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }
}

/// Coordination-store connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// etcd endpoints, e.g. `["http://127.0.0.1:2379"]`.
    pub endpoints: Vec<String>,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
        }
    }
}

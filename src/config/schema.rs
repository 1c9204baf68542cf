//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal config is legal.

use serde::{Deserialize, Serialize};

/// Root configuration for the daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Chain endpoint and contract addresses.
    pub chain: ChainConfig,

    /// Filter polling cadence and degradation thresholds.
    pub filters: FiltersConfig,

    /// Per-client websocket delivery settings.
    pub websocket: WebsocketConfig,

    /// Signing delegation settings.
    pub signing: SigningConfig,

    /// Shutdown drain settings.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:31337").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:31337".to_string(),
        }
    }
}

/// Chain endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Address of the bounty registry contract.
    pub bounty_registry_address: String,

    /// Address of the artifact registry contract.
    pub artifact_registry_address: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            bounty_registry_address: "0x0000000000000000000000000000000000000000".to_string(),
            artifact_registry_address: "0x0000000000000000000000000000000000000000".to_string(),
        }
    }
}

/// Filter polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Minimum wait between polls in milliseconds.
    pub min_wait_ms: u64,

    /// Maximum wait for backoff-enabled filters in milliseconds.
    pub max_wait_ms: u64,

    /// Consecutive failures before subscribers get a degraded notification.
    pub degraded_threshold: u32,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: 500,
            max_wait_ms: 4000,
            degraded_threshold: 5,
        }
    }
}

/// Per-client websocket delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebsocketConfig {
    /// Outbound queue bound per client; exceeding it disconnects the client.
    pub queue_capacity: usize,

    /// Socket write deadline per message in seconds.
    pub send_timeout_secs: u64,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            send_timeout_secs: 10,
        }
    }
}

/// Signing delegation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// How long one request may stay awaiting a signature, in seconds.
    pub deadline_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self { deadline_secs: 30 }
    }
}

/// Shutdown drain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Bound on draining in-flight polls and signing responses, in seconds.
    pub shutdown_deadline_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_deadline_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Label attached to logs and metrics, e.g. `goerli`
    #[serde(default = "default_network_name")]
    pub name: String,
    /// WebSocket endpoint of the node. Head subscriptions need a pubsub transport.
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_database_uri")]
    pub uri: String,
    #[serde(default = "default_database_name")]
    pub name: String,
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            uri: default_database_uri(),
            name: default_database_name(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// What the reconciler does when a block in the missing range cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FetchFailurePolicy {
    /// Log and move on to the next block number. Leaves a gap.
    #[default]
    Skip,
    /// Retry with backoff up to `max_attempts`, then skip.
    Retry { max_attempts: u32 },
    /// Stop the cycle at the first unfetchable block. The next head
    /// notification resumes from the stored height, so no gap is left.
    AbortCycle,
}

/// When the Header and Block records of a fetched block are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockWritePolicy {
    /// Write once the block itself was fetched, empty blocks included.
    #[default]
    Always,
    /// Write only when at least one transaction was upserted.
    RequireTransaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub fetch_failure: FetchFailurePolicy,
    pub block_write: BlockWritePolicy,
    /// Upper bound on the joined header/block derivation tasks
    pub derive_timeout_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fetch_failure: FetchFailurePolicy::default(),
            block_write: BlockWritePolicy::default(),
            derive_timeout_ms: 5_000,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// When false, the first subscription error stops notification delivery.
    pub resubscribe: bool,
    /// Consecutive failed subscribe attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            resubscribe: true,
            max_attempts: None,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_network_name() -> String {
    "ethereum".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_database_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "scanner".to_string()
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

/// New canonical tip announced by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadNotification {
    pub number: u64,
    pub hash: B256,
}

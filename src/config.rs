//! Configuration
//!
//! One TOML file with a section per role plus logging. Every field has a
//! default, so any subset (or no file at all) is a valid configuration.

pub mod facade;
pub mod merge;
pub mod sources;

pub use crate::logging::LoggingConfig;
pub use config::ConfigError;
pub use facade::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default configuration file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "filewatch.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilewatchConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FilewatchConfig {
    /// Render as TOML, the format the loader reads back.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Node agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Storage service to replicate into
    #[serde(default = "default_storage_address")]
    pub storage_address: String,

    /// Node identity; the host name when unset
    #[serde(default)]
    pub node_id: Option<String>,

    /// Directory to watch; the OS temp directory when unset
    #[serde(default)]
    pub watch_root: Option<PathBuf>,

    /// Wait between connection attempts
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Capacity of the event channel feeding the batcher
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage_address: default_storage_address(),
            node_id: None,
            watch_root: None,
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Storage service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_address")]
    pub listen_address: String,

    /// sled database directory
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            listen_address: default_storage_address(),
            db_path: default_db_path(),
        }
    }
}

/// Aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// HTTP listen address
    #[serde(default = "default_aggregator_address")]
    pub listen_address: String,

    /// Storage service to pull snapshots from
    #[serde(default = "default_storage_address")]
    pub storage_address: String,

    /// Upper bound on one snapshot pull, dial included
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            listen_address: default_aggregator_address(),
            storage_address: default_storage_address(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_storage_address() -> String {
    "127.0.0.1:4100".to_string()
}

fn default_aggregator_address() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("filewatch.sled")
}

fn default_reconnect_backoff_ms() -> u64 {
    10_000
}

fn default_event_buffer() -> usize {
    256
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

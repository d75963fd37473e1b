//! CLI Tooling
//!
//! Command-line interface: pick a role to host, or print the effective
//! configuration.

use crate::config::{ConfigError, ConfigLoader, FilewatchConfig, DEFAULT_CONFIG_FILE};
use crate::logging::LoggingConfig;
use crate::service::Role;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Filewatch CLI - replicate watched directories into a central store
#[derive(Parser, Debug)]
#[command(name = "filewatch")]
#[command(about = "Replicate watched directories into a central store and serve the aggregated view")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a directory and replicate its file set into storage
    Node,
    /// Serve the path store to nodes and the aggregator
    Storage,
    /// Serve the aggregated file listing over HTTP
    Aggregator,
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

/// Field overrides for `filewatch config`
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Node: storage service address
    #[arg(long)]
    pub storage_address: Option<String>,

    /// Node: identity (defaults to the host name)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Node: directory to watch
    #[arg(long)]
    pub watch_root: Option<PathBuf>,

    /// Node: milliseconds between connection attempts
    #[arg(long)]
    pub reconnect_backoff_ms: Option<u64>,

    /// Storage: listen address
    #[arg(long)]
    pub storage_listen: Option<String>,

    /// Storage: database directory
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Aggregator: HTTP listen address
    #[arg(long)]
    pub aggregator_listen: Option<String>,

    /// Aggregator: milliseconds allowed for one snapshot pull
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ConfigArgs {
    /// Overlay the given fields onto `config`.
    pub fn apply(&self, config: &mut FilewatchConfig) {
        if let Some(address) = &self.storage_address {
            config.node.storage_address = address.clone();
            config.aggregator.storage_address = address.clone();
        }
        if let Some(node_id) = &self.node_id {
            config.node.node_id = Some(node_id.clone());
        }
        if let Some(root) = &self.watch_root {
            config.node.watch_root = Some(root.clone());
        }
        if let Some(backoff) = self.reconnect_backoff_ms {
            config.node.reconnect_backoff_ms = backoff;
        }
        if let Some(address) = &self.storage_listen {
            config.storage.listen_address = address.clone();
        }
        if let Some(path) = &self.db_path {
            config.storage.db_path = path.clone();
        }
        if let Some(address) = &self.aggregator_listen {
            config.aggregator.listen_address = address.clone();
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.aggregator.request_timeout_ms = timeout;
        }
    }
}

impl Cli {
    /// The role to host, if the command runs one
    pub fn role(&self) -> Option<Role> {
        match self.command {
            Commands::Node => Some(Role::Node),
            Commands::Storage => Some(Role::Storage),
            Commands::Aggregator => Some(Role::Aggregator),
            Commands::Config(_) => None,
        }
    }

    /// Fold `--log-*` flags into the loaded logging section.
    pub fn apply_log_overrides(&self, logging: &mut LoggingConfig) {
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            logging.file = Some(file.clone());
        }
    }
}

/// Configuration resolved for one invocation
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub config: FilewatchConfig,
    /// False when the file was absent and defaults were used
    pub config_present: bool,
}

impl CliContext {
    /// Load the configuration named by `cli`, with its log flags applied.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config_path = cli.config.clone();
        let config_present = ConfigLoader::is_present(&config_path);
        let mut config = ConfigLoader::load(&config_path)?;
        cli.apply_log_overrides(&mut config.logging);
        Ok(Self {
            config_path,
            config,
            config_present,
        })
    }
}

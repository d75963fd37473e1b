//! Process lifecycle shared by every role.

use crate::aggregator::AggregatorService;
use crate::config::FilewatchConfig;
use crate::error::ServiceError;
use crate::node::NodeAgent;
use crate::rpc::StorageService;
use async_trait::async_trait;
use std::fmt;

/// A long-running component driven by the process host.
///
/// Constructed with `initialize(config)`. `run` starts background work and
/// returns once the component is serving, or with its startup error. `stop`
/// is idempotent and returns after background work has finished.
#[async_trait]
pub trait Runnable: Send {
    fn name(&self) -> &'static str;

    async fn run(&mut self) -> Result<(), ServiceError>;

    async fn stop(&mut self);
}

/// Which component this process hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Watch a directory and replicate it into storage
    Node,
    /// Serve the path store over RPC
    Storage,
    /// Serve the aggregated view over HTTP
    Aggregator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Node => "node",
            Role::Storage => "storage",
            Role::Aggregator => "aggregator",
        }
    }

    /// Build this role's component from `config`.
    pub fn build(self, config: &FilewatchConfig) -> Box<dyn Runnable> {
        match self {
            Role::Node => Box::new(NodeAgent::initialize(config.node.clone())),
            Role::Storage => Box::new(StorageService::initialize(config.storage.clone())),
            Role::Aggregator => {
                Box::new(AggregatorService::initialize(config.aggregator.clone()))
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

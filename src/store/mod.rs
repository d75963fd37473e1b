//! Path Store
//!
//! Durable per-node record of which paths currently exist. Each node owns one
//! namespace mapping path -> presence marker.

pub mod persistence;

use crate::error::StorageError;
use crate::types::{NodeSnapshot, Operation, Transaction};

pub use persistence::SledPathStore;

/// Prefix of every namespace tree name in the backing database
pub const NAMESPACE_PREFIX: &str = "node/";

/// Backing tree name for a node's namespace
pub fn namespace_name(node_id: &str) -> String {
    format!("{NAMESPACE_PREFIX}{node_id}")
}

/// Path Store interface
///
/// Each call is one atomic unit against the backing store.
pub trait PathStore: Send + Sync {
    /// Apply `transaction` in order, creating the namespace if absent.
    ///
    /// Returns the applied operations. On error nothing from the batch is
    /// applied and the caller must retry the whole batch.
    fn update(&self, transaction: &Transaction) -> Result<Vec<Operation>, StorageError>;

    /// Remove a node's namespace; [`StorageError::NamespaceNotFound`] if absent.
    fn delete_list(&self, node_id: &str) -> Result<(), StorageError>;

    /// One snapshot per namespace, in no particular order.
    fn list_files(&self) -> Result<Vec<NodeSnapshot>, StorageError>;

    /// Persist everything written so far.
    fn flush(&self) -> Result<(), StorageError>;
}

//! Core types shared by the node agent, the storage service and the aggregator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NodeId: identity of a watching machine; also names its storage namespace
pub type NodeId = String;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Create,
    Remove,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Create => f.write_str("Create"),
            OpKind::Remove => f.write_str("Remove"),
        }
    }
}

/// Operation: a single existence change of a root-relative, `/`-separated path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub path: String,
    pub kind: OpKind,
}

impl Operation {
    pub fn create(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: OpKind::Create,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: OpKind::Remove,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// Transaction: an ordered batch of operations for one node.
///
/// Sent node -> storage; the storage replies with a Transaction holding the
/// operations it applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub node_id: NodeId,
    pub operations: Vec<Operation>,
}

/// NodeSnapshot: the storage's current view of one node's file set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub files: Vec<String>,
}

impl NodeSnapshot {
    /// Sort files lexicographically so responses are deterministic.
    pub fn sorted(mut self) -> Self {
        self.files.sort();
        self
    }
}

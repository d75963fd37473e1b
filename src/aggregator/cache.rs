//! Last good snapshot, shared by concurrent requests.

use crate::types::NodeSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;

/// Single guarded slot; readers always see a whole snapshot.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    last_good: RwLock<Option<Arc<Vec<NodeSnapshot>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Vec<NodeSnapshot>>> {
        self.last_good.read().clone()
    }

    /// Replace the cached snapshot; last writer wins.
    pub fn replace(&self, snapshot: Arc<Vec<NodeSnapshot>>) {
        *self.last_good.write() = Some(snapshot);
    }

    pub fn is_populated(&self) -> bool {
        self.last_good.read().is_some()
    }
}

//! Per-namespace locking for the storage engine
//!
//! Writes to one node's namespace (batch updates, wholesale deletion) are
//! mutually exclusive; writes to different namespaces proceed in parallel.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Lock manager handing out one lock per namespace name
pub struct NamespaceLockManager {
    /// Namespace name -> its lock; entries live as long as the manager
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl NamespaceLockManager {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the lock for `namespace`.
    pub fn get_lock(&self, namespace: &str) -> Arc<Mutex<()>> {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(namespace) {
                return Arc::clone(lock);
            }
        }

        // Another thread may have inserted it between the two guards.
        let mut map = self.locks.write();
        Arc::clone(
            map.entry(namespace.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

impl Default for NamespaceLockManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Sled-backed path store.

use super::{namespace_name, PathStore, NAMESPACE_PREFIX};
use crate::concurrency::NamespaceLockManager;
use crate::error::StorageError;
use crate::types::{NodeSnapshot, OpKind, Operation, Transaction};
use sled::transaction::{TransactionError, TransactionResult};
use sled::IVec;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Path store keeping one sled tree per node namespace
pub struct SledPathStore {
    db: sled::Db,
    locks: NamespaceLockManager,
}

impl SledPathStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        info!(path = %path.display(), "Opened path store");
        Ok(Self::from_db(db))
    }

    /// Throwaway database, removed on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db))
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            locks: NamespaceLockManager::new(),
        }
    }

    fn namespace_exists(&self, name: &str) -> bool {
        self.db
            .tree_names()
            .iter()
            .any(|existing| existing.as_ref() == name.as_bytes())
    }
}

/// Keys below each removed path, indexed like `operations`.
///
/// A removed directory takes its subtree with it: every key already stored
/// under it, plus every path created under it earlier in the same batch.
fn descendants(
    tree: &sled::Tree,
    operations: &[Operation],
) -> Result<Vec<Vec<IVec>>, sled::Error> {
    let mut created: BTreeSet<&str> = BTreeSet::new();
    let mut below = Vec::with_capacity(operations.len());
    for op in operations {
        let mut keys = Vec::new();
        match op.kind {
            OpKind::Create => {
                created.insert(op.path.as_str());
            }
            OpKind::Remove => {
                let prefix = subtree_prefix(&op.path);
                for key in tree.scan_prefix(prefix.as_bytes()).keys() {
                    keys.push(key?);
                }
                keys.extend(
                    created
                        .range(prefix.as_str()..)
                        .take_while(|path| path.starts_with(prefix.as_str()))
                        .map(|path| IVec::from(path.as_bytes())),
                );
            }
        }
        below.push(keys);
    }
    Ok(below)
}

fn subtree_prefix(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

impl PathStore for SledPathStore {
    fn update(&self, transaction: &Transaction) -> Result<Vec<Operation>, StorageError> {
        let name = namespace_name(&transaction.node_id);
        let lock = self.locks.get_lock(&name);
        let _guard = lock.lock();

        let existed = self.namespace_exists(&name);
        let tree = self.db.open_tree(&name)?;
        let below = match descendants(&tree, &transaction.operations) {
            Ok(below) => below,
            Err(e) => {
                if !existed {
                    self.db.drop_tree(name.as_bytes())?;
                }
                return Err(e.into());
            }
        };
        let marker: &[u8] = &[];
        let result: TransactionResult<(), ()> = tree.transaction(|tx| {
            for (op, below) in transaction.operations.iter().zip(&below) {
                match op.kind {
                    OpKind::Create => {
                        tx.insert(op.path.as_bytes(), marker)?;
                    }
                    OpKind::Remove => {
                        tx.remove(op.path.as_bytes())?;
                        for key in below {
                            tx.remove(key.clone())?;
                        }
                    }
                }
            }
            Ok(())
        });

        if let Err(e) = result {
            if !existed {
                if let Err(drop_err) = self.db.drop_tree(name.as_bytes()) {
                    warn!(namespace = %name, error = %drop_err, "Failed to drop namespace after aborted update");
                }
            }
            return Err(match e {
                TransactionError::Storage(e) => StorageError::Fault(e),
                TransactionError::Abort(()) => StorageError::Fault(sled::Error::Unsupported(
                    "update transaction aborted".to_string(),
                )),
            });
        }
        self.db.flush()?;

        debug!(
            node_id = %transaction.node_id,
            applied = transaction.operations.len(),
            created_namespace = !existed,
            "Applied update"
        );
        Ok(transaction.operations.clone())
    }

    fn delete_list(&self, node_id: &str) -> Result<(), StorageError> {
        let name = namespace_name(node_id);
        let lock = self.locks.get_lock(&name);
        let _guard = lock.lock();

        if !self.db.drop_tree(name.as_bytes())? {
            return Err(StorageError::NamespaceNotFound(node_id.to_string()));
        }
        self.db.flush()?;
        info!(node_id = %node_id, "Deleted namespace");
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<NodeSnapshot>, StorageError> {
        let names: Vec<IVec> = self.db.tree_names();
        let mut nodes = Vec::new();

        for name in names {
            let Some(node_id) = name.strip_prefix(NAMESPACE_PREFIX.as_bytes()) else {
                continue;
            };
            let node_id = String::from_utf8_lossy(node_id).into_owned();
            let name = namespace_name(&node_id);
            let lock = self.locks.get_lock(&name);
            let _guard = lock.lock();

            // Opening a dropped tree would recreate it.
            if !self.namespace_exists(&name) {
                continue;
            }
            let tree = self.db.open_tree(&name)?;
            let mut files = Vec::with_capacity(tree.len());
            for key in tree.iter().keys() {
                files.push(String::from_utf8_lossy(&key?).into_owned());
            }
            nodes.push(NodeSnapshot { id: node_id, files });
        }

        debug!(nodes = nodes.len(), "Listed namespaces");
        Ok(nodes)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

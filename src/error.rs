//! Error types for every layer of the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Path normalization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChrootError {
    #[error("`{}` is not an absolute path", .0.display())]
    NotAbsolute(PathBuf),

    #[error("`{}` is not part of the path `{}`", .root.display(), .path.display())]
    NotContained { path: PathBuf, root: PathBuf },
}

/// Directory watcher errors
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("'{}' cannot be watched: {source}", .path.display())]
    Unwatchable {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to create filesystem watcher: {0}")]
    Backend(#[source] notify::Error),

    #[error("failed to walk watch root: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Chroot(#[from] ChrootError),
}

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("storage fault: {0}")]
    Fault(#[from] sled::Error),
}

/// Errors reported by the storage service to a remote caller
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("storage fault: {0}")]
    Storage(String),

    #[error("response of {0} bytes exceeds the frame limit")]
    ResponseTooLarge(usize),
}

impl From<StorageError> for RemoteError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NamespaceNotFound(id) => RemoteError::NamespaceNotFound(id),
            other => RemoteError::Storage(other.to_string()),
        }
    }
}

/// Wire RPC errors, seen by the caller side
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("connection closed by peer")]
    Closed,

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl RpcError {
    /// True when the remote reported a missing namespace.
    pub fn is_namespace_not_found(&self) -> bool {
        matches!(self, RpcError::Remote(RemoteError::NamespaceNotFound(_)))
    }
}

/// Aggregator errors
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("storage backend unreachable: {0}")]
    BackendUnreachable(#[source] RpcError),
}

/// Top-level service errors surfaced by the lifecycle contract
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),
}

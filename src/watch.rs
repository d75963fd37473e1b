//! Watch runtime: filesystem events, batching, and the directory watcher.

mod events;
mod runtime;

pub use events::{BatchSource, BatcherInput, ChangeEvent, EventBatcher, EventSink};
pub use runtime::DirectoryWatcher;

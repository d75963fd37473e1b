//! Directory watcher: initial listing plus a live stream of existence changes.

use super::events::{convert_event, ChangeEvent, EventSink};
use crate::error::WatchError;
use crate::tree::path::chroot;
use crate::tree::walker::walk;
use crate::types::{OpKind, Operation};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watches a directory tree, one OS subscription per directory.
pub struct DirectoryWatcher {
    root: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watching: Mutex<HashSet<PathBuf>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<notify::Result<Event>>>>,
    cancel: CancellationToken,
}

impl DirectoryWatcher {
    /// Create a watcher for `root`. Nothing is subscribed until
    /// [`check_root`](Self::check_root) or [`initial_scan`](Self::initial_scan).
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WatchError> {
        let root = root.as_ref();
        // Backends report resolved paths; resolve the root the same way.
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res| {
            if tx.send(res).is_err() {
                debug!("Watch event dropped, receiver closed");
            }
        })
        .map_err(WatchError::Backend)?;

        Ok(Self {
            root,
            watcher: Mutex::new(Some(watcher)),
            watching: Mutex::new(HashSet::new()),
            events: Mutex::new(Some(rx)),
            cancel: CancellationToken::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories currently subscribed to
    pub fn watching(&self) -> Vec<PathBuf> {
        self.watching.lock().iter().cloned().collect()
    }

    /// Verify the root is a directory and subscribe to it.
    pub fn check_root(&self) -> Result<(), WatchError> {
        match self.root.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(WatchError::NotADirectory(self.root.clone())),
        }
        self.subscribe(&self.root)
    }

    /// List the whole tree as `Create` operations, subscribing to every directory.
    ///
    /// The first walk, chroot or subscription error aborts the scan.
    pub fn initial_scan(&self) -> Result<Vec<Operation>, WatchError> {
        let mut operations = Vec::new();
        walk(&self.root, |entry| {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let path = chroot(entry.path(), &self.root)?;
            operations.push(Operation::create(path));
            if entry.file_type().is_dir() {
                self.subscribe(entry.path())?;
            }
            Ok(())
        })?;
        info!(
            root = %self.root.display(),
            entries = operations.len(),
            directories = self.watching.lock().len(),
            "Initial scan complete"
        );
        Ok(operations)
    }

    /// Forward live changes to `sink` until stopped.
    ///
    /// Chroot failures and walk errors on single events are logged and skipped.
    pub async fn stream_events(&self, sink: EventSink) {
        let Some(mut rx) = self.events.lock().take() else {
            warn!("Event stream already consumed");
            return;
        };

        loop {
            let res = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                res = rx.recv() => match res {
                    Some(res) => res,
                    None => break,
                },
            };

            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Watch error");
                    continue;
                }
            };

            for change in convert_event(&event) {
                for op in self.handle_change(&change) {
                    if !sink.send(op).await {
                        debug!("Batcher gone, ending event stream");
                        return;
                    }
                }
            }
        }
        debug!(root = %self.root.display(), "Event stream ended");
    }

    /// Release every OS subscription and end the event stream. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
        if self.watcher.lock().take().is_some() {
            self.watching.lock().clear();
            info!(root = %self.root.display(), "Stopped watching");
        }
    }

    fn handle_change(&self, change: &ChangeEvent) -> Vec<Operation> {
        let path = change.path();
        let relative = match chroot(path, &self.root) {
            Ok(relative) => relative,
            Err(e) => {
                error!(error = %e, "Dropping event outside the watch root");
                return Vec::new();
            }
        };

        match change.kind() {
            OpKind::Create => {
                let mut ops = vec![Operation::create(relative)];
                let is_dir = path.symlink_metadata().map(|m| m.is_dir()).unwrap_or(false);
                if is_dir {
                    ops.extend(self.adopt_directory(path));
                }
                ops
            }
            OpKind::Remove => {
                if self.watching.lock().remove(path) {
                    if let Some(watcher) = self.watcher.lock().as_mut() {
                        // The backend usually drops the watch on its own.
                        let _ = watcher.unwatch(path);
                    }
                }
                vec![Operation::remove(relative)]
            }
        }
    }

    /// Subscribe to a new directory and report what it already contains, since
    /// entries created before the subscription produce no events.
    fn adopt_directory(&self, dir: &Path) -> Vec<Operation> {
        let mut ops = Vec::new();
        let result = walk(dir, |entry| {
            if entry.file_type().is_dir() {
                self.subscribe(entry.path())?;
            }
            if entry.path() != dir {
                ops.push(Operation::create(chroot(entry.path(), &self.root)?));
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!(dir = %dir.display(), error = %e, "Failed to adopt new directory");
        }
        ops
    }

    fn subscribe(&self, dir: &Path) -> Result<(), WatchError> {
        if self.watching.lock().contains(dir) {
            return Ok(());
        }
        let mut guard = self.watcher.lock();
        let Some(watcher) = guard.as_mut() else {
            return Ok(());
        };
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Unwatchable {
                path: dir.to_path_buf(),
                source,
            })?;
        drop(guard);
        self.watching.lock().insert(dir.to_path_buf());
        debug!(dir = %dir.display(), "Subscribed");
        Ok(())
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::events::EventBatcher;
    use std::collections::HashSet;
    use std::fs;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn basename(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_check_root_accepts_directory() {
        let temp = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(temp.path()).unwrap();
        watcher.check_root().unwrap();
        assert_eq!(watcher.watching(), vec![watcher.root().to_path_buf()]);
    }

    #[test]
    fn test_check_root_rejects_file_and_missing() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, b"x").unwrap();

        let watcher = DirectoryWatcher::new(&file).unwrap();
        assert!(matches!(watcher.check_root(), Err(WatchError::NotADirectory(_))));

        let watcher = DirectoryWatcher::new(temp.path().join("missing")).unwrap();
        assert!(matches!(watcher.check_root(), Err(WatchError::NotADirectory(_))));
    }

    #[test]
    fn test_initial_scan_lists_tree() {
        let temp = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(temp.path()).unwrap();
        fs::write(root.join("a.txt"), b"x").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/b.txt"), b"x").unwrap();

        let watcher = DirectoryWatcher::new(&root).unwrap();
        let ops = watcher.initial_scan().unwrap();

        let base = basename(&root);
        let paths: HashSet<String> = ops.iter().map(|op| op.path.clone()).collect();
        let expected: HashSet<String> = [
            base.clone(),
            format!("{base}/a.txt"),
            format!("{base}/sub"),
            format!("{base}/sub/b.txt"),
        ]
        .into_iter()
        .collect();
        assert_eq!(paths, expected);
        assert!(ops.iter().all(|op| op.kind == OpKind::Create));

        let watching: HashSet<PathBuf> = watcher.watching().into_iter().collect();
        assert!(watching.contains(&root));
        assert!(watching.contains(&root.join("sub")));
        assert_eq!(watching.len(), 2);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(temp.path()).unwrap();
        watcher.check_root().unwrap();
        watcher.stop();
        watcher.stop();
        assert!(watcher.watching().is_empty());
    }

    struct Harness {
        _watcher: std::sync::Arc<DirectoryWatcher>,
        source: crate::watch::events::BatchSource,
        cancel: CancellationToken,
        _stream: JoinHandle<()>,
    }

    impl Harness {
        fn start(root: &Path) -> Self {
            let watcher = std::sync::Arc::new(DirectoryWatcher::new(root).unwrap());
            watcher.check_root().unwrap();
            watcher.initial_scan().unwrap();
            let cancel = CancellationToken::new();
            let (sink, source, _) = EventBatcher::spawn(64, cancel.clone());
            let streaming = std::sync::Arc::clone(&watcher);
            let stream = tokio::spawn(async move { streaming.stream_events(sink).await });
            Self {
                _watcher: watcher,
                source,
                cancel,
                _stream: stream,
            }
        }

        /// Collect operations until `wanted` is seen or the deadline passes.
        async fn wait_for(&mut self, wanted: &Operation) -> Vec<Operation> {
            let mut seen = Vec::new();
            let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
            while !seen.contains(wanted) {
                let batch = tokio::time::timeout_at(deadline, self.source.next_batch())
                    .await
                    .unwrap_or_else(|_| panic!("timed out waiting for {wanted}, saw {seen:?}"))
                    .unwrap();
                seen.extend(batch);
                self.source.delivered().await;
            }
            seen
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    #[tokio::test]
    async fn test_stream_reports_create_rename_remove() {
        let temp = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(temp.path()).unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        let base = basename(&root);
        let mut harness = Harness::start(&root);

        fs::write(root.join("sub/file"), b"x").unwrap();
        harness
            .wait_for(&Operation::create(format!("{base}/sub/file")))
            .await;

        fs::rename(root.join("sub/file"), root.join("moved")).unwrap();
        let seen = harness
            .wait_for(&Operation::create(format!("{base}/moved")))
            .await;
        let seen = if seen.contains(&Operation::remove(format!("{base}/sub/file"))) {
            seen
        } else {
            harness
                .wait_for(&Operation::remove(format!("{base}/sub/file")))
                .await
        };
        assert!(!seen.is_empty());

        fs::remove_file(root.join("moved")).unwrap();
        harness
            .wait_for(&Operation::remove(format!("{base}/moved")))
            .await;
    }

    #[tokio::test]
    async fn test_stream_subscribes_new_directories() {
        let temp = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(temp.path()).unwrap();
        let base = basename(&root);
        let mut harness = Harness::start(&root);

        fs::create_dir(root.join("fresh")).unwrap();
        harness
            .wait_for(&Operation::create(format!("{base}/fresh")))
            .await;

        fs::write(root.join("fresh/inner"), b"x").unwrap();
        harness
            .wait_for(&Operation::create(format!("{base}/fresh/inner")))
            .await;
    }
}

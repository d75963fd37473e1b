//! Filesystem walker used for the initial listing of a watch root.

use crate::error::WatchError;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Walk `root` (inclusive) and hand every entry to `visit`. Symbolic links
/// are reported, never followed.
///
/// Stops at the first walk error or the first error returned by `visit`.
pub fn walk<F>(root: &Path, mut visit: F) -> Result<usize, WatchError>
where
    F: FnMut(&DirEntry) -> Result<(), WatchError>,
{
    let mut visited = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        visit(&entry)?;
        visited += 1;
    }
    Ok(visited)
}

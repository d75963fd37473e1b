//! Lexical path cleaning and re-rooting of watched paths.
//!
//! Every path reported to storage is produced here. The storage key for a file
//! is its path relative to the *parent* of the watch root, so the root's own
//! basename is always the first segment (`/srv/data/a.txt` under `/srv/data`
//! becomes `data/a.txt`). A watch root of `/` keeps paths unchanged.

use crate::error::ChrootError;
use std::path::{Component, Path, PathBuf};

/// Lexically clean a path: drop `.` segments, resolve `..` against the
/// preceding segment and collapse repeated separators.
///
/// `..` directly under the root is dropped. An empty result becomes `.`.
/// The filesystem is never consulted.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component)
            }
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Re-root `path` under the basename of `root`.
///
/// Fails with [`ChrootError::NotAbsolute`] if either cleaned input is relative
/// and with [`ChrootError::NotContained`] if `path` is not under `root`.
pub fn chroot(path: &Path, root: &Path) -> Result<String, ChrootError> {
    let path = clean_path(path);
    let root = clean_path(root);
    if !root.is_absolute() {
        return Err(ChrootError::NotAbsolute(root));
    }
    if !path.is_absolute() {
        return Err(ChrootError::NotAbsolute(path));
    }
    if !path.starts_with(&root) {
        return Err(ChrootError::NotContained { path, root });
    }

    match root.parent() {
        None => Ok(to_slash(&path)),
        Some(parent) => match path.strip_prefix(parent) {
            Ok(relative) => Ok(to_slash(relative)),
            Err(_) => Err(ChrootError::NotContained { path, root }),
        },
    }
}

/// Render a path with `/` separators, keeping a leading `/` for rooted paths.
fn to_slash(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push('/'),
            Component::Normal(segment) => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&segment.to_string_lossy());
            }
            _ => {}
        }
    }
    out
}

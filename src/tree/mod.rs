//! Filesystem tree helpers: path re-rooting and walking.

pub mod path;
pub mod walker;

pub use path::{chroot, clean_path};

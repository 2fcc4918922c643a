//! Demonstration jobs built on top of the core driver: a directory walk, a
//! chunked parallel copy, and a checksum verification pass.

pub mod checksum;
pub mod copy;
pub mod walk;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Shared directory-walk helper: every regular file under `root`, as a path
/// relative to `root`.
pub(crate) fn relative_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}

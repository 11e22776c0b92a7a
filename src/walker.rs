//! Enumerates candidate `.eml` files under a root directory

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::{ImportError, Result};

/// Lazy, sorted stream of `.eml` paths
///
/// Yields paths in byte-wise order of their full path strings, so `a.eml`
/// comes before `a/z.eml` and `a-b.eml` before both.
pub struct EmlWalker {
    inner: walkdir::IntoIter,
}

impl std::fmt::Debug for EmlWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmlWalker").finish_non_exhaustive()
    }
}

/// Start walking `root`; direct children only unless `recursive`
pub fn walk(root: &Path, recursive: bool) -> Result<EmlWalker> {
    if !root.is_dir() {
        return Err(ImportError::NotFound(root.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let inner = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by(|a, b| sibling_key(a).cmp(&sibling_key(b)))
        .into_iter();

    Ok(EmlWalker { inner })
}

/// Directories sort as `name/` so each subtree lands where its paths would
fn sibling_key(entry: &DirEntry) -> String {
    let mut key = entry.file_name().to_string_lossy().into_owned();
    if entry.file_type().is_dir() {
        key.push('/');
    }
    key
}

/// Number of candidates `walk` would yield
pub fn count(root: &Path, recursive: bool) -> Result<usize> {
    Ok(walk(root, recursive)?.count())
}

/// `.eml` extension, any case
pub fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
}

impl Iterator for EmlWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_eml(entry.path()) {
                        return Some(entry.into_path());
                    }
                }
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                }
            }
        }
    }
}

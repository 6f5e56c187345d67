//! Directory traversal of the source root.

use std::path::{Component, Path};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::contract::FileLister;
use crate::error::SyncError;

/// Default [`FileLister`]: a sorted recursive walk returning files and
/// directories relative to the root.
#[derive(Debug, Clone, Default)]
pub struct WalkDirLister {
    /// Include entries whose name starts with `.` (and everything below them).
    pub include_hidden: bool,
}

impl WalkDirLister {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with('.'))
                .unwrap_or(false)
    }
}

/// Render a relative path with `/` separators regardless of platform.
/// `None` if any component is not valid UTF-8.
pub fn to_posix(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str()?);
        }
    }
    Some(parts.join("/"))
}

impl FileLister for WalkDirLister {
    fn list(&self, root: &Path) -> Result<Vec<String>, SyncError> {
        let include_hidden = self.include_hidden;
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| include_hidden || !Self::is_hidden(e));

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| SyncError::Listing {
                root: root.to_path_buf(),
                source,
            })?;
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            match to_posix(relative) {
                Some(path) => paths.push(path),
                None => warn!(
                    path = %entry.path().display(),
                    "Skipping entry whose name is not valid UTF-8"
                ),
            }
        }
        debug!(root = %root.display(), entries = paths.len(), "Listed source directory");
        Ok(paths)
    }
}

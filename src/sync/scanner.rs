// Source tree scanning
// Full traversal on every cycle, emitting `/`-separated paths relative to the source root

use jwalk::WalkDir;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::sync::exclude::IgnoreRules;

/// Walks the source tree and yields upload candidates.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    rules: IgnoreRules,
    /// File never yielded, e.g. a local manifest kept inside the source tree.
    skip_file: Option<PathBuf>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, rules: IgnoreRules) -> Self {
        Self {
            root: root.into(),
            rules,
            skip_file: None,
        }
    }

    /// Never yield `path`, even if it lies under the root.
    pub fn skipping(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip_file = Some(path.into());
        self
    }

    /// Scan the tree. The result is sorted so iteration order is deterministic.
    pub fn scan(&self) -> SyncResult<Vec<String>> {
        let canonical_root = self.root.canonicalize().map_err(|e| SyncError::Scan {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;
        let skip_file = self.skip_file.as_deref().and_then(canonical_file_path);

        let mut candidates = Vec::new();
        let mut ignored = 0usize;

        for entry in WalkDir::new(&canonical_root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
        {
            let entry = entry.map_err(|e| SyncError::Scan {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| canonical_root.clone()),
                reason: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let full_path = entry.path();
            if skip_file.as_deref() == Some(full_path.as_path()) {
                continue;
            }

            let relative = match full_path.strip_prefix(&canonical_root).ok().and_then(relative_string) {
                Some(relative) => relative,
                None => {
                    warn!("Skipping file with a non UTF-8 path: {}", full_path.display());
                    continue;
                }
            };

            if self.rules.is_ignored(&relative) {
                ignored += 1;
                continue;
            }

            candidates.push(relative);
        }

        candidates.sort();
        debug!(
            "Scanned {}: {} candidates, {} ignored",
            self.root.display(),
            candidates.len(),
            ignored
        );

        Ok(candidates)
    }
}

/// Join path components with `/`, whatever the platform separator is.
fn relative_string(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Canonical form of a file path whose file may not exist yet.
fn canonical_file_path(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    parent.canonicalize().ok().map(|dir| dir.join(file_name))
}

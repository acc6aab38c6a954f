//! Ignore rules for the source scan.
//!
//! Two kinds of rule: file-name suffixes (`ignore_extensions`) and
//! .gitignore-style globs (`exclude_patterns`). Rules only keep files out of
//! the candidate set; they never remove anything already uploaded.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};

/// Compiled ignore rules.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    /// Suffixes matched against the file name.
    extensions: Vec<String>,
    /// Compiled glob set for matching.
    glob_set: GlobSet,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::none()
    }
}

impl IgnoreRules {
    /// Rules that ignore nothing.
    pub fn none() -> Self {
        Self {
            extensions: Vec::new(),
            glob_set: GlobSet::empty(),
        }
    }

    /// Build rules from extension suffixes and glob patterns.
    pub fn new(extensions: &[String], patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            extensions: extensions.to_vec(),
            glob_set: builder.build()?,
        })
    }

    /// Rules with only extension suffixes.
    pub fn from_extensions<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.as_ref().to_string()).collect(),
            ..Self::none()
        }
    }

    /// Check whether a relative path (`/`-separated) must be skipped.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        if self.extensions.iter().any(|ext| file_name.ends_with(ext.as_str())) {
            return true;
        }

        if self.glob_set.is_empty() {
            return false;
        }

        if self.glob_set.is_match(relative_path) || self.glob_set.is_match(file_name) {
            return true;
        }

        // Directory patterns like "cache" should hide everything below them
        Path::new(relative_path).components().any(|component| match component {
            Component::Normal(name) => self.glob_set.is_match(name.to_string_lossy().as_ref()),
            _ => false,
        })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

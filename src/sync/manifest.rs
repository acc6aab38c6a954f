// Manifest handling
// Reads and writes the plain text "already uploaded" lists, locally and on the remote side

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::remote::{NoProgress, RemoteChannel};

/// Relative paths confirmed to exist at the destination.
///
/// Append-only: nothing in the crate ever removes an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedSet {
    paths: BTreeSet<String>,
}

impl UploadedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text: one path per `\n`-terminated line, taken verbatim.
    ///
    /// Only `\n` ends a line. A `\r` is a legal file name byte and stays part
    /// of the entry.
    pub fn parse(content: &str) -> Self {
        if content.is_empty() {
            return Self::new();
        }
        let body = content.strip_suffix('\n').unwrap_or(content);
        body.split('\n').map(str::to_string).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Returns `true` if the path was not recorded yet.
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Set union. Commutative and idempotent.
    pub fn union(&self, other: &UploadedSet) -> UploadedSet {
        UploadedSet {
            paths: self.paths.union(&other.paths).cloned().collect(),
        }
    }

    /// Write one entry per line.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        for path in &self.paths {
            writeln!(writer, "{}", path)?;
        }
        Ok(())
    }
}

impl FromIterator<String> for UploadedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for UploadedSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

/// Loads, merges and persists the local and remote manifests.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    local_path: PathBuf,
    remote_path: String,
}

impl ManifestStore {
    pub fn new(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Read the local manifest. A missing file is an empty set.
    pub fn load_local(&self) -> SyncResult<UploadedSet> {
        read_manifest(&self.local_path, "reading local manifest").map(|set| set.unwrap_or_default())
    }

    /// Download and parse the remote manifest. An absent one is an empty set.
    pub async fn fetch_remote(&self, channel: &dyn RemoteChannel) -> SyncResult<UploadedSet> {
        if !channel.exists(&self.remote_path).await? {
            debug!("No remote manifest at {}", self.remote_path);
            return Ok(UploadedSet::new());
        }

        // Removed on drop, whichever way this returns
        let scratch = TempDir::with_prefix("datapush-sync")
            .map_err(|e| SyncError::storage("creating temp dir for", std::env::temp_dir(), e))?;
        let download = scratch.path().join("already_uploaded_server.txt");

        channel.get_file(&self.remote_path, &download).await?;

        let set = read_manifest(&download, "reading downloaded manifest")?.unwrap_or_default();
        debug!("Remote manifest lists {} files", set.len());
        Ok(set)
    }

    /// Union of both manifests; argument order never matters.
    pub fn merge(local: &UploadedSet, remote: &UploadedSet) -> UploadedSet {
        local.union(remote)
    }

    /// Replace the local manifest with `set`, durably.
    pub fn persist_local(&self, set: &UploadedSet) -> SyncResult<()> {
        let dir = match self.local_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| SyncError::storage("creating", &dir, e))?;

        let tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| SyncError::storage("creating temp file in", &dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            set.write_to(&mut writer)
                .and_then(|_| writer.flush())
                .map_err(|e| SyncError::storage("writing", tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| SyncError::storage("syncing", tmp.path(), e))?;

        tmp.persist(&self.local_path)
            .map_err(|e| SyncError::storage("replacing", &self.local_path, e.error))?;
        Ok(())
    }

    /// Upload the local manifest file over the remote one.
    pub async fn push_remote(&self, channel: &dyn RemoteChannel) -> SyncResult<()> {
        channel
            .put_file(&self.local_path, &self.remote_path, &mut NoProgress)
            .await
    }
}

/// Read a manifest file; `Ok(None)` if it does not exist.
fn read_manifest(path: &Path, operation: &'static str) -> SyncResult<Option<UploadedSet>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(UploadedSet::parse(&content))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::storage(operation, path, e)),
    }
}

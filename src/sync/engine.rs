//! Sync engine for one-directional push mirroring.
//!
//! One call to [`SyncEngine::run_cycle`] is one reconciliation pass: merge
//! the local and remote manifests, scan the source tree, and upload every
//! file not yet recorded, one at a time. After each successful upload both
//! manifests are rewritten before the next file is touched, so a crash
//! between files never loses or duplicates a record.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{remote_join, Config};
use crate::error::{SyncError, SyncResult};
use crate::remote::{connector_for, Connector, RemoteChannel};
use crate::sync::manifest::{ManifestStore, UploadedSet};
use crate::sync::progress::TransferBar;
use crate::sync::scanner::Scanner;

/// Outcome of a successful cycle. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Candidates yielded by the scan.
    pub files_scanned: usize,
    /// Files sent during this cycle.
    pub files_uploaded: usize,
    /// Candidates already recorded in a manifest.
    pub files_skipped: usize,
    /// Bytes sent for uploaded files (manifests excluded).
    pub bytes_uploaded: u64,
    pub duration: Duration,
}

/// Orchestrates reconciliation cycles against one destination.
pub struct SyncEngine {
    config: Arc<Config>,
    connector: Arc<dyn Connector>,
    manifests: ManifestStore,
    scanner: Scanner,
}

impl SyncEngine {
    /// Create an engine using the connector matching the configured transport.
    pub fn from_config(config: Arc<Config>) -> Self {
        let connector = connector_for(&config.connection);
        Self::new(config, connector)
    }

    /// Create an engine with an explicit connector.
    pub fn new(config: Arc<Config>, connector: Arc<dyn Connector>) -> Self {
        let manifests = ManifestStore::new(config.local_manifest_path(), config.remote_manifest_path());
        let scanner = Scanner::new(&config.source_root, config.ignore.clone())
            .skipping(config.local_manifest_path());

        Self {
            config,
            connector,
            manifests,
            scanner,
        }
    }

    /// Run one reconciliation cycle.
    ///
    /// Any error aborts the rest of the cycle; files committed before the
    /// failure stay recorded in both manifests.
    pub async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let started = Instant::now();

        let channel = self.connector.connect().await?;
        info!("Connected to {}", channel.describe());

        let outcome = self.reconcile(channel.as_ref()).await;

        if let Err(e) = channel.close().await {
            warn!("Failed to close channel to {}: {}", channel.describe(), e);
        }

        let mut report = outcome?;
        report.duration = started.elapsed();
        Ok(report)
    }

    async fn reconcile(&self, channel: &dyn RemoteChannel) -> SyncResult<CycleReport> {
        channel.ensure_dir(&self.config.destination_root).await?;

        let remote = self.manifests.fetch_remote(channel).await?;
        let store = self.manifests.clone();
        let local = blocking("reading", self.manifests.local_path(), move || store.load_local()).await?;
        let mut uploaded = ManifestStore::merge(&remote, &local);
        debug!(
            "Manifests: {} local, {} remote, {} merged",
            local.len(),
            remote.len(),
            uploaded.len()
        );

        self.converge(channel, &uploaded, &local, &remote).await?;

        let scanner = self.scanner.clone();
        let candidates = blocking("scanning", &self.config.source_root, move || scanner.scan()).await?;
        let mut report = CycleReport {
            files_scanned: candidates.len(),
            ..CycleReport::default()
        };

        for path in &candidates {
            if uploaded.contains(path) {
                debug!("Skipping {} (already uploaded)", path);
                report.files_skipped += 1;
                continue;
            }

            let bytes = self.upload(channel, path).await?;

            // Commit this file before touching the next one
            uploaded.insert(path.clone());
            self.persist_local(&uploaded).await?;
            self.manifests.push_remote(channel).await?;

            report.files_uploaded += 1;
            report.bytes_uploaded += bytes;
        }

        Ok(report)
    }

    /// Rewrite whichever manifest is missing entries the other one has.
    async fn converge(
        &self,
        channel: &dyn RemoteChannel,
        merged: &UploadedSet,
        local: &UploadedSet,
        remote: &UploadedSet,
    ) -> SyncResult<()> {
        let local_behind = merged.len() > local.len();
        let remote_behind = merged.len() > remote.len();

        if local_behind || remote_behind {
            self.persist_local(merged).await?;
        }
        if local_behind {
            info!(
                "Restored {} entries from the remote manifest",
                merged.len() - local.len()
            );
        }
        if remote_behind {
            self.manifests.push_remote(channel).await?;
            info!(
                "Pushed {} missing entries to the remote manifest",
                merged.len() - remote.len()
            );
        }
        Ok(())
    }

    async fn persist_local(&self, set: &UploadedSet) -> SyncResult<()> {
        let store = self.manifests.clone();
        let set = set.clone();
        blocking("writing", self.manifests.local_path(), move || store.persist_local(&set)).await
    }

    /// Send one file, creating its remote parent directory first.
    async fn upload(&self, channel: &dyn RemoteChannel, path: &str) -> SyncResult<u64> {
        let destination = &self.config.destination_root;
        if let Some((dir, _)) = path.rsplit_once('/') {
            channel.ensure_dir(&remote_join(destination, dir)).await?;
        }

        let local_path = self.config.source_root.join(path);
        let remote_path = remote_join(destination, path);
        let size = file_size(&local_path).await?;

        info!("Uploading {} ({})", path, humansize::format_size(size, humansize::BINARY));

        let mut bar = TransferBar::new(path, self.config.show_progress);
        let result = channel.put_file(&local_path, &remote_path, &mut bar).await;
        bar.finish();
        result?;

        Ok(size)
    }
}

/// Run local file work off the async worker.
async fn blocking<T, F>(operation: &'static str, path: &Path, work: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SyncError::storage(operation, path, io::Error::other(e)))?
}

async fn file_size(path: &Path) -> SyncResult<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .map_err(|e| SyncError::storage("reading metadata of", path, e))
}

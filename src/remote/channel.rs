use async_trait::async_trait;
use std::path::Path;

use crate::error::SyncResult;

/// Receives cumulative byte counts while a file is being sent.
///
/// Called synchronously from inside `put_file`, zero or more times, with
/// non-decreasing `bytes_sent`. Purely observational.
pub trait TransferProgress: Send {
    fn on_progress(&mut self, bytes_sent: u64, total_bytes: u64);
}

/// Progress sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn on_progress(&mut self, _bytes_sent: u64, _total_bytes: u64) {}
}

impl<F> TransferProgress for F
where
    F: FnMut(u64, u64) + Send,
{
    fn on_progress(&mut self, bytes_sent: u64, total_bytes: u64) {
        self(bytes_sent, total_bytes)
    }
}

/// An open session to the destination host.
///
/// Remote paths are `/`-separated strings. Implementations never retry an
/// operation themselves; any failure is reported as a `SyncError` and the
/// caller decides what happens to the cycle.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Create a directory and all of its parents. Succeeds if it already exists.
    async fn ensure_dir(&self, path: &str) -> SyncResult<()>;

    /// Check whether a file exists at `path`.
    async fn exists(&self, path: &str) -> SyncResult<bool>;

    /// Download `remote_path` into `local_path`, replacing it.
    async fn get_file(&self, remote_path: &str, local_path: &Path) -> SyncResult<()>;

    /// Upload `local_path` to `remote_path`, replacing any existing file.
    async fn put_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &mut dyn TransferProgress,
    ) -> SyncResult<()>;

    /// Tear the session down.
    async fn close(&self) -> SyncResult<()>;

    /// Human readable target, for log lines.
    fn describe(&self) -> String;
}

/// Opens channels. One channel is opened per sync cycle.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteChannel>>;
}

/// Chunk size used by streaming uploads.
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

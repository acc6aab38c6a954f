use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{SyncError, SyncResult};
use crate::remote::channel::{Connector, RemoteChannel, TransferProgress, TRANSFER_CHUNK_SIZE};

/// Connector for destinations on a locally mounted filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteChannel>> {
        Ok(Box::new(LocalChannel))
    }
}

/// Channel whose "remote" paths are paths on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalChannel;

impl LocalChannel {
    fn path(remote_path: &str) -> PathBuf {
        PathBuf::from(remote_path)
    }
}

#[async_trait]
impl RemoteChannel for LocalChannel {
    async fn ensure_dir(&self, path: &str) -> SyncResult<()> {
        fs::create_dir_all(Self::path(path))
            .await
            .map_err(|e| SyncError::remote("mkdir", path, e))
    }

    async fn exists(&self, path: &str) -> SyncResult<bool> {
        match fs::metadata(Self::path(path)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::remote("stat", path, e)),
        }
    }

    async fn get_file(&self, remote_path: &str, local_path: &Path) -> SyncResult<()> {
        fs::copy(Self::path(remote_path), local_path)
            .await
            .map_err(|e| SyncError::remote("get", remote_path, e))?;
        Ok(())
    }

    async fn put_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &mut dyn TransferProgress,
    ) -> SyncResult<()> {
        let mut source = fs::File::open(local_path)
            .await
            .map_err(|e| SyncError::storage("opening", local_path, e))?;
        let total = source
            .metadata()
            .await
            .map_err(|e| SyncError::storage("reading metadata of", local_path, e))?
            .len();

        let mut dest = fs::File::create(Self::path(remote_path))
            .await
            .map_err(|e| SyncError::remote("put", remote_path, e))?;

        progress.on_progress(0, total);

        let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = source
                .read(&mut buf)
                .await
                .map_err(|e| SyncError::storage("reading", local_path, e))?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n])
                .await
                .map_err(|e| SyncError::remote("put", remote_path, e))?;
            sent += n as u64;
            progress.on_progress(sent, total);
        }

        dest.flush()
            .await
            .map_err(|e| SyncError::remote("put", remote_path, e))?;
        dest.sync_all()
            .await
            .map_err(|e| SyncError::remote("put", remote_path, e))?;

        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "local filesystem".to_string()
    }
}

use async_trait::async_trait;
use opendal::{services::Sftp, ErrorKind, Operator};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::KnownHosts;
use crate::error::{SyncError, SyncResult};
use crate::remote::channel::{Connector, RemoteChannel, TransferProgress, TRANSFER_CHUNK_SIZE};

/// Connects to an SSH host and speaks SFTP through OpenDAL.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    host: String,
    port: u16,
    user: String,
    key_path: PathBuf,
    known_hosts: KnownHosts,
}

impl SftpConnector {
    pub fn new(host: &str, port: u16, user: &str, key_path: &Path, known_hosts: KnownHosts) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            key_path: key_path.to_path_buf(),
            known_hosts,
        }
    }

    fn endpoint(&self) -> String {
        format!("ssh://{}:{}", self.host, self.port)
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteChannel>> {
        let connection_error = |reason: String| SyncError::Connection {
            target: self.target(),
            reason,
        };

        debug!(
            "Connecting to {} with {} as key",
            self.target(),
            self.key_path.display()
        );

        let builder = Sftp::default()
            .endpoint(&self.endpoint())
            .user(&self.user)
            .key(&self.key_path.to_string_lossy())
            .known_hosts_strategy(self.known_hosts.as_str())
            .root("/");

        let operator = Operator::new(builder)
            .map_err(|e| connection_error(e.to_string()))?
            .finish();

        // The session is opened lazily; force it now so auth problems surface here
        operator
            .check()
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Box::new(SftpChannel {
            operator,
            target: self.target(),
        }))
    }
}

/// An established SFTP session.
pub struct SftpChannel {
    operator: Operator,
    target: String,
}

impl SftpChannel {
    /// OpenDAL paths are relative to the operator root.
    fn op_path(path: &str) -> &str {
        path.trim_start_matches('/')
    }
}

#[async_trait]
impl RemoteChannel for SftpChannel {
    async fn ensure_dir(&self, path: &str) -> SyncResult<()> {
        let dir = Self::op_path(path).trim_end_matches('/');
        if dir.is_empty() {
            return Ok(());
        }

        // Trailing slash marks a directory; parents are created as needed
        self.operator
            .create_dir(&format!("{}/", dir))
            .await
            .map_err(|e| SyncError::remote("mkdir", path, e))
    }

    async fn exists(&self, path: &str) -> SyncResult<bool> {
        match self.operator.stat(Self::op_path(path)).await {
            Ok(meta) => Ok(meta.mode().is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::remote("stat", path, e)),
        }
    }

    async fn get_file(&self, remote_path: &str, local_path: &Path) -> SyncResult<()> {
        let content = self
            .operator
            .read(Self::op_path(remote_path))
            .await
            .map_err(|e| SyncError::remote("get", remote_path, e))?;

        tokio::fs::write(local_path, content.to_vec())
            .await
            .map_err(|e| SyncError::storage("writing", local_path, e))
    }

    async fn put_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &mut dyn TransferProgress,
    ) -> SyncResult<()> {
        let mut file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| SyncError::storage("opening", local_path, e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| SyncError::storage("reading metadata of", local_path, e))?
            .len();

        let mut writer = self
            .operator
            .writer(Self::op_path(remote_path))
            .await
            .map_err(|e| SyncError::remote("put", remote_path, e))?;

        progress.on_progress(0, total);

        let mut sent = 0u64;
        loop {
            let mut chunk = vec![0u8; TRANSFER_CHUNK_SIZE];
            let n = file
                .read(&mut chunk)
                .await
                .map_err(|e| SyncError::storage("reading", local_path, e))?;
            if n == 0 {
                break;
            }
            chunk.truncate(n);

            writer
                .write(chunk)
                .await
                .map_err(|e| SyncError::remote("put", remote_path, e))?;
            sent += n as u64;
            progress.on_progress(sent, total);
        }

        writer
            .close()
            .await
            .map_err(|e| SyncError::remote("put", remote_path, e))?;

        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        // Dropping the operator closes the SSH session
        debug!("Closing SFTP session to {}", self.target);
        Ok(())
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

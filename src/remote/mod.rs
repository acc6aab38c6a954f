//! Remote channel seam: the sync engine only talks to these traits.

pub mod channel;
pub mod local;
pub mod sftp;

pub use channel::{Connector, NoProgress, RemoteChannel, TransferProgress};
pub use local::{LocalChannel, LocalConnector};
pub use sftp::{SftpChannel, SftpConnector};

use std::sync::Arc;

use crate::config::ConnectionInfo;

/// Build the connector matching the configured transport.
pub fn connector_for(connection: &ConnectionInfo) -> Arc<dyn Connector> {
    match connection {
        ConnectionInfo::Sftp {
            host,
            user,
            key_path,
            port,
            known_hosts,
        } => Arc::new(SftpConnector::new(host, *port, user, key_path, *known_hosts)),
        ConnectionInfo::Local => Arc::new(LocalConnector::new()),
    }
}

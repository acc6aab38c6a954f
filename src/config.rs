//! Daemon configuration.
//!
//! The config file is read once at startup, checked against a fixed schema
//! and turned into an immutable [`Config`]. TOML is the native format; YAML
//! files (`.yaml` / `.yml`) are accepted too so existing data-push configs
//! keep working.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::sync::exclude::IgnoreRules;

/// Default minutes between successful cycles.
pub const DEFAULT_UPDATE_FREQUENCY_MINUTES: u64 = 60;
/// Largest accepted `update_frequency`, one hundred years.
pub const MAX_UPDATE_FREQUENCY_MINUTES: u64 = 100 * 366 * 24 * 60;
/// Default scheduler poll granularity.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_SSH_PORT: u16 = 22;

/// File name of the manifest kept in `manifest_dir`.
pub const LOCAL_MANIFEST_NAME: &str = "already_uploaded.txt";
/// File name of the manifest kept in the destination root.
pub const REMOTE_MANIFEST_NAME: &str = ".already_uploaded.txt";

/// How the destination is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Sftp,
    /// Destination is a locally mounted directory.
    Local,
}

/// Host key policy for SFTP sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownHosts {
    Strict,
    Accept,
    /// Accept unknown hosts and remember them.
    #[default]
    Add,
}

impl KnownHosts {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownHosts::Strict => "Strict",
            KnownHosts::Accept => "Accept",
            KnownHosts::Add => "Add",
        }
    }
}

/// Connection settings. Opaque to the sync engine; only connectors read them.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionInfo {
    Sftp {
        host: String,
        user: String,
        key_path: PathBuf,
        port: u16,
        known_hosts: KnownHosts,
    },
    Local,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionInfo::Sftp { host, user, port, .. } => write!(f, "{}@{}:{}", user, host, port),
            ConnectionInfo::Local => write!(f, "local"),
        }
    }
}

/// Validated, immutable settings shared by every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_root: PathBuf,
    pub destination_root: String,
    pub connection: ConnectionInfo,
    pub update_frequency_minutes: u64,
    pub ignore: IgnoreRules,
    pub manifest_dir: PathBuf,
    pub poll_interval: Duration,
    pub show_progress: bool,
}

impl Config {
    /// Load and validate a config file. The format is picked from the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let raw = match ConfigFormat::from_path(path) {
            ConfigFormat::Toml => toml::from_str::<RawConfig>(&contents).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str::<RawConfig>(&contents).map_err(|e| e.to_string()),
        }
        .map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        raw.validate()
    }

    /// Parse and validate TOML config text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        raw.validate()
    }

    /// Parse and validate YAML config text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        raw.validate()
    }

    pub fn update_frequency(&self) -> Duration {
        Duration::from_secs(self.update_frequency_minutes.saturating_mul(60))
    }

    pub fn local_manifest_path(&self) -> PathBuf {
        self.manifest_dir.join(LOCAL_MANIFEST_NAME)
    }

    pub fn remote_manifest_path(&self) -> String {
        remote_join(&self.destination_root, REMOTE_MANIFEST_NAME)
    }
}

/// Join a relative path onto a remote root using `/` separators.
pub fn remote_join(root: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if root.is_empty() {
        return relative.to_string();
    }
    format!("{}/{}", root.trim_end_matches('/'), relative)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

/// A value that must be a string or an integer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    ssh_host: Option<Scalar>,
    ssh_user: Option<Scalar>,
    ssh_key: Option<Scalar>,
    ssh_port: Option<u16>,
    source: Option<Scalar>,
    destination: Option<Scalar>,
    update_frequency: Option<u64>,
    ignore_extensions: Vec<String>,
    exclude_patterns: Vec<String>,
    manifest_dir: Option<PathBuf>,
    poll_interval_seconds: Option<u64>,
    transport: Transport,
    known_hosts: KnownHosts,
    show_progress: Option<bool>,
}

impl RawConfig {
    fn validate(self) -> Result<Config, ConfigError> {
        // Presence and type of every required element comes first.
        let connection = match self.transport {
            Transport::Sftp => {
                let host = required_scalar("ssh_host", self.ssh_host)?;
                let user = required_scalar("ssh_user", self.ssh_user)?;
                let key = required_scalar("ssh_key", self.ssh_key)?;
                Some((host, user, key))
            }
            Transport::Local => None,
        };
        let source = required_scalar("source", self.source)?;
        let destination = required_scalar("destination", self.destination)?;

        let connection = match connection {
            Some((host, user, key)) => {
                let key_path = PathBuf::from(key);
                if !key_path.is_file() {
                    return Err(ConfigError::KeyFileMissing(key_path));
                }
                ConnectionInfo::Sftp {
                    host,
                    user,
                    key_path,
                    port: self.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
                    known_hosts: self.known_hosts,
                }
            }
            None => ConnectionInfo::Local,
        };

        let source_root = PathBuf::from(source);
        if !source_root.is_dir() {
            return Err(ConfigError::SourceMissing(source_root));
        }

        if destination.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "destination",
                reason: "must not be empty".to_string(),
            });
        }

        if let Some(ext) = self.ignore_extensions.iter().find(|ext| ext.is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "ignore_extensions",
                reason: format!("empty extension {:?} would ignore every file", ext),
            });
        }

        let ignore = IgnoreRules::new(&self.ignore_extensions, &self.exclude_patterns).map_err(|e| {
            ConfigError::InvalidValue {
                key: "exclude_patterns",
                reason: e.to_string(),
            }
        })?;

        let update_frequency_minutes = self
            .update_frequency
            .unwrap_or(DEFAULT_UPDATE_FREQUENCY_MINUTES);
        if update_frequency_minutes > MAX_UPDATE_FREQUENCY_MINUTES {
            return Err(ConfigError::InvalidValue {
                key: "update_frequency",
                reason: format!("must be at most {} minutes", MAX_UPDATE_FREQUENCY_MINUTES),
            });
        }

        let poll_seconds = self.poll_interval_seconds.unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS);
        if poll_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval_seconds",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Config {
            source_root,
            destination_root: destination,
            connection,
            update_frequency_minutes,
            ignore,
            manifest_dir: self.manifest_dir.unwrap_or_else(|| PathBuf::from(".")),
            poll_interval: Duration::from_secs(poll_seconds),
            show_progress: self.show_progress.unwrap_or(true),
        })
    }
}

fn required_scalar(key: &'static str, value: Option<Scalar>) -> Result<String, ConfigError> {
    match value {
        None => Err(ConfigError::MissingKey(key)),
        Some(Scalar::Text(text)) => Ok(text),
        Some(Scalar::Int(number)) => Ok(number.to_string()),
        Some(Scalar::Other(_)) => Err(ConfigError::InvalidValue {
            key,
            reason: "must be a string or an integer".to_string(),
        }),
    }
}

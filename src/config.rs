use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::validate_port;

/// Default listen port when neither `PORT` nor the port file provide one.
pub const DEFAULT_PORT: u16 = 20261;

/// Default upload ceiling: 4 GiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no valid shared folders configured")]
    NoShares,
}

/// Port file written by the desktop collaborator.
#[derive(Debug, Deserialize)]
struct PortFile {
    port: u16,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub shares: Vec<PathBuf>,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub control_dir: PathBuf,
    pub control_poll_interval: Duration,
    pub shutdown_command_timeout: Duration,
    pub max_upload_bytes: u64,
    pub extra_preview_extensions: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables and the persisted
    /// desktop files they point at.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let shares = match env("SHARE_DIRS") {
            Some(list) => std::env::split_paths(&list).collect(),
            None => {
                let file = env("SHARED_FOLDERS_FILE")
                    .unwrap_or_else(|| "shared_folders.json".to_string());
                load_shared_folders(Path::new(&file))?
            }
        };

        let port = match env("PORT") {
            Some(raw) => parse_port(&raw)?,
            None => {
                let file =
                    env("PORT_CONFIG_FILE").unwrap_or_else(|| "port_config.json".to_string());
                load_port(Path::new(&file))?
            }
        };

        let bind_addr = match env("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::Invalid {
                    key: "BIND_ADDR",
                    reason: e.to_string(),
                }
            })?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let parse_u64 = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match env(key) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key,
                    reason: format!("'{}' is not a non-negative integer", raw),
                }),
                None => Ok(default),
            }
        };

        let poll_secs = parse_u64("CONTROL_POLL_SECS", 5)?.max(1);
        let command_timeout = parse_u64("SHUTDOWN_COMMAND_TIMEOUT_SECS", 10)?.max(1);

        Ok(Self {
            shares,
            bind_addr,
            port,
            control_dir: env("CONTROL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            control_poll_interval: Duration::from_secs(poll_secs),
            shutdown_command_timeout: Duration::from_secs(command_timeout),
            max_upload_bytes: parse_u64("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            extra_preview_extensions: env("PREVIEW_EXTRA_EXTENSIONS")
                .map(|raw| parse_extension_list(&raw))
                .unwrap_or_default(),
        })
    }

    /// Configuration with defaults for everything but the share list.
    pub fn with_shares(shares: Vec<PathBuf>, control_dir: PathBuf) -> Self {
        Self {
            shares,
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            control_dir,
            control_poll_interval: Duration::from_secs(5),
            shutdown_command_timeout: Duration::from_secs(10),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            extra_preview_extensions: Vec::new(),
        }
    }

    /// Drop share entries that are not existing directories, keeping order.
    pub fn validated_shares(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let mut valid = Vec::with_capacity(self.shares.len());
        for path in &self.shares {
            if path.is_dir() {
                valid.push(path.clone());
            } else {
                tracing::warn!("Skipping shared folder that is not a directory: {}", path.display());
            }
        }

        if valid.is_empty() {
            return Err(ConfigError::NoShares);
        }
        Ok(valid)
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let port: u16 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: "PORT",
        reason: format!("'{}' is not a port number", raw),
    })?;
    validate_port(port).map_err(|reason| ConfigError::Invalid { key: "PORT", reason })
}

/// Read the JSON array of share directories. A missing file means "no shares".
pub fn load_shared_folders(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let Some(raw) = read_optional(path)? else {
        tracing::info!("{} not found, starting without saved folders", path.display());
        return Ok(Vec::new());
    };

    let folders: Vec<PathBuf> = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Loaded {} shared folders from {}", folders.len(), path.display());
    Ok(folders)
}

/// Read `{"port": N}`. A missing file means the default port.
pub fn load_port(path: &Path) -> Result<u16, ConfigError> {
    let Some(raw) = read_optional(path)? else {
        return Ok(DEFAULT_PORT);
    };

    let file: PortFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate_port(file.port).map_err(|reason| ConfigError::Invalid { key: "port", reason })
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse `".srt, flac,.M4A"` into `[".srt", ".flac", ".m4a"]`.
fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty() && ext != ".")
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}

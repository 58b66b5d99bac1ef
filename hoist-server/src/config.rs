use crate::{Result, ServerError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_prefix() -> String {
    "backups".to_string()
}

fn default_max_upload_mb() -> u64 {
    100
}

/// Receiver configuration loaded from a TOML document.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
    pub storage: StorageConfig,
    pub clients: Vec<ClientEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// One authorised sender: the API key it presents and the id that becomes
/// its key prefix in storage.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEntry {
    pub id: String,
    pub api_key: String,
}

impl ReceiverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut cfg: ReceiverConfig = toml::from_str(raw)?;
        cfg.storage.root = expand_tilde(&cfg.storage.root);
        if cfg.clients.is_empty() {
            return Err(ServerError::Config(
                "at least one [[clients]] entry is required".to_string(),
            ));
        }
        Ok(cfg)
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

use crate::{Result, SyncError};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_debounce_seconds() -> u64 {
    3
}

fn default_max_attempts() -> u32 {
    100
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_restart_hour() -> u32 {
    1
}

/// Agent configuration loaded from a TOML document. Path-valued fields
/// accept a leading `~/`, expanded against the user's home directory
/// before the absolute-path check.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub watches: Vec<WatchRoot>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(skip)]
    exclude: Vec<Regex>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// A watched local root and the remote prefix applied to every path
/// discovered under it. Watching is always recursive.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchRoot {
    pub local_path: PathBuf,
    pub remote_prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub upload_existing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce_seconds(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay_seconds(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
    /// Local wall-clock hour at which the failure check runs.
    #[serde(default = "default_restart_hour")]
    pub hour: u32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            hour: default_restart_hour(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut cfg: AgentConfig = toml::from_str(raw)?;
        cfg.finalize()?;
        Ok(cfg)
    }

    fn finalize(&mut self) -> Result<()> {
        self.database.path = expand_tilde(&self.database.path);
        for watch in &mut self.watches {
            watch.local_path = expand_tilde(&watch.local_path);
        }

        if !self.database.path.is_absolute() {
            return Err(SyncError::Config(format!(
                "database.path must be an absolute path, got {:?}",
                self.database.path
            )));
        }
        for watch in &self.watches {
            if !watch.local_path.is_absolute() {
                return Err(SyncError::Config(format!(
                    "watches.local_path must be an absolute path, got {:?}",
                    watch.local_path
                )));
            }
        }
        if self.restart.hour > 23 {
            return Err(SyncError::Config(format!(
                "restart.hour must be 0-23, got {}",
                self.restart.hour
            )));
        }

        self.exclude = self
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    SyncError::Config(format!("invalid exclude pattern {pattern:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    /// True iff any compiled exclusion pattern matches the remote path.
    pub fn is_excluded(&self, remote_path: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(remote_path))
    }

    /// Derive the remote path for a local file by the longest matching
    /// watch-root prefix. Returns `None` for paths outside every root.
    pub fn remote_path_for(&self, local_path: &Path) -> Option<String> {
        let mut best: Option<(&WatchRoot, &Path)> = None;
        for watch in &self.watches {
            if let Ok(rel) = local_path.strip_prefix(&watch.local_path) {
                let better = match best {
                    Some((current, _)) => {
                        watch.local_path.components().count()
                            > current.local_path.components().count()
                    }
                    None => true,
                };
                if better {
                    best = Some((watch, rel));
                }
            }
        }
        best.map(|(watch, rel)| join_remote(&watch.remote_prefix, rel))
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.upload.max_file_size_mb * 1_048_576
    }
}

/// Join a remote prefix and a relative path with forward-slash separators.
fn join_remote(prefix: &str, rel: &Path) -> String {
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        rel
    } else {
        format!("{prefix}/{rel}")
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

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(extra: &str) -> String {
        format!(
            r#"
{extra}

[server]
url = "http://localhost:8080"
api_key = "secret"

[database]
path = "/var/lib/hoist/catalog.db"

[[watches]]
local_path = "/srv/data"
remote_prefix = "uploads/"
"#
        )
    }

    #[test]
    fn defaults_applied() {
        let cfg = AgentConfig::from_toml_str(&minimal("")).unwrap();
        assert_eq!(cfg.stability.debounce_seconds, 3);
        assert_eq!(cfg.stability.max_attempts, 100);
        assert_eq!(cfg.upload.retry_attempts, 3);
        assert_eq!(cfg.upload.retry_delay_seconds, 5);
        assert_eq!(cfg.upload.max_file_size_mb, 100);
        assert_eq!(cfg.restart.hour, 1);
        assert!(!cfg.scan.upload_existing);
    }

    #[test]
    fn relative_database_path_rejected() {
        let raw = minimal("").replace("/var/lib/hoist/catalog.db", "catalog.db");
        assert!(matches!(
            AgentConfig::from_toml_str(&raw),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn relative_watch_root_rejected() {
        let raw = minimal("").replace("/srv/data", "data");
        assert!(matches!(
            AgentConfig::from_toml_str(&raw),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn invalid_exclude_pattern_rejected() {
        let raw = minimal(r#"exclude_patterns = ["["]"#);
        assert!(matches!(
            AgentConfig::from_toml_str(&raw),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn tilde_expands_against_home() {
        let raw = minimal("").replace("/srv/data", "~/data");
        let cfg = AgentConfig::from_toml_str(&raw).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(cfg.watches[0].local_path, home.join("data"));
    }

    #[test]
    fn remote_path_uses_prefix_and_forward_slashes() {
        let cfg = AgentConfig::from_toml_str(&minimal("")).unwrap();
        assert_eq!(
            cfg.remote_path_for(Path::new("/srv/data/a/b.bin")).as_deref(),
            Some("uploads/a/b.bin")
        );
        assert_eq!(cfg.remote_path_for(Path::new("/elsewhere/b.bin")), None);
    }

    #[test]
    fn longest_watch_root_prefix_wins() {
        let raw = minimal("") + r#"
[[watches]]
local_path = "/srv/data/special"
remote_prefix = "special/"
"#;
        let cfg = AgentConfig::from_toml_str(&raw).unwrap();
        assert_eq!(
            cfg.remote_path_for(Path::new("/srv/data/special/x.bin"))
                .as_deref(),
            Some("special/x.bin")
        );
        assert_eq!(
            cfg.remote_path_for(Path::new("/srv/data/other/x.bin"))
                .as_deref(),
            Some("uploads/other/x.bin")
        );
    }

    #[test]
    fn exclusion_matches_remote_path() {
        let raw = minimal(r#"exclude_patterns = ["/thumbnails/", "\\.tmp$"]"#);
        let cfg = AgentConfig::from_toml_str(&raw).unwrap();
        assert!(cfg.is_excluded("uploads/thumbnails/a.jpg"));
        assert!(cfg.is_excluded("uploads/work/job.tmp"));
        assert!(!cfg.is_excluded("uploads/work/job.dat"));
    }

    #[test]
    fn restart_hour_out_of_range_rejected() {
        let raw = minimal("") + "\n[restart]\nhour = 24\n";
        assert!(matches!(
            AgentConfig::from_toml_str(&raw),
            Err(SyncError::Config(_))
        ));
    }
}

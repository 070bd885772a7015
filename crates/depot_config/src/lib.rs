//! Configuration management for Depot
//!
//! This crate handles loading and validating `.depot/config.toml`

use depot_common::{DepotError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the config file and the default store
pub const CONFIG_DIR: &str = ".depot";

/// Env var overriding `[remote] base_url`
pub const ENV_REMOTE_URL: &str = "DEPOT_REMOTE_URL";

/// Env var overriding `[realtime] url`
pub const ENV_WS_URL: &str = "DEPOT_WS_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace root path (set programmatically, not in TOML)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Storage configuration ([storage])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file, relative paths resolve against the workspace root
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".depot/depot.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Remote mutation API configuration ([remote])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Outbox draining configuration ([sync])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed applications before a mutation is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Drain automatically on reconnect and after local writes
    #[serde(default = "default_true")]
    pub auto_sync: bool,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_probe_interval_ms() -> u64 {
    10_000
}
fn default_probe_timeout_ms() -> u64 {
    3_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            auto_sync: true,
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// Realtime channel configuration ([realtime])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_ws_url() -> String {
    "ws://localhost:8000/ws/stock".to_string()
}
fn default_base_delay_ms() -> u64 {
    3_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_pong_timeout_ms() -> u64 {
    5_000
}
fn default_connect_timeout_ms() -> u64 {
    20_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Config {
    /// Defaults rooted at `workspace_root`
    pub fn with_root(workspace_root: &Path) -> Self {
        Self {
            root: workspace_root.to_path_buf(),
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }

    /// Load configuration from workspace root
    ///
    /// A missing file yields defaults. Environment overrides apply either way.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config_path = Self::path_in(workspace_root);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| DepotError::ConfigError(format!("Failed to read config: {}", e)))?;
            Self::parse(&content)?
        } else {
            Self::with_root(workspace_root)
        };

        config.root = workspace_root.to_path_buf();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DepotError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Location of the config file under `workspace_root`
    pub fn path_in(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join("config.toml")
    }

    /// Absolute path of the durable store
    pub fn storage_path(&self) -> PathBuf {
        if self.storage.path.is_absolute() {
            self.storage.path.clone()
        } else {
            self.root.join(&self.storage.path)
        }
    }

    /// Serialized defaults, written by `depot init`
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::with_root(Path::new(".")))
            .map_err(|e| DepotError::ConfigError(format!("Failed to render config: {}", e)))
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_REMOTE_URL).filter(|v| !v.is_empty()) {
            self.remote.base_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.is_empty()) {
            self.realtime.url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load(temp.path()).unwrap();

        assert_eq!(config.root, temp.path());
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.realtime.base_delay_ms, 3_000);
        assert_eq!(config.realtime.max_attempts, 5);
        assert_eq!(config.storage_path(), temp.path().join(".depot/depot.db"));
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = Config::parse(
            r#"
            [remote]
            base_url = "https://backend.example.com"

            [realtime]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.base_url, "https://backend.example.com");
        assert_eq!(config.remote.timeout_ms, 15_000);
        assert_eq!(config.realtime.max_attempts, 2);
        assert_eq!(config.realtime.pong_timeout_ms, 5_000);
        assert!(config.sync.auto_sync);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::parse("[sync\nmax_retries = ").unwrap_err();
        assert!(matches!(err, DepotError::ConfigError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::with_root(Path::new("/tmp/ws"));
        config.apply_env_overrides(|key| match key {
            ENV_REMOTE_URL => Some("http://10.0.0.5:8000".to_string()),
            ENV_WS_URL => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.remote.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.realtime.url, default_ws_url());
    }

    #[test]
    fn test_default_toml_parses_back() {
        let rendered = Config::default_toml().unwrap();
        let parsed = Config::parse(&rendered).unwrap();
        assert_eq!(parsed.sync.probe_interval_ms, 10_000);
        assert_eq!(parsed.storage.path, PathBuf::from(".depot/depot.db"));
    }

    #[test]
    fn test_absolute_storage_path_is_kept() {
        let mut config = Config::with_root(Path::new("/srv/app"));
        config.storage.path = PathBuf::from("/var/lib/depot.db");
        assert_eq!(config.storage_path(), PathBuf::from("/var/lib/depot.db"));
    }
}

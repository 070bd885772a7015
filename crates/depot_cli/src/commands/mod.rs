//! Command implementations and the workspace they run against

pub mod entities;
pub mod listen;
pub mod sync;

use anyhow::Result;
use depot_common::DepotError;
use depot_config::{Config, CONFIG_DIR};
use depot_core::{HttpRemote, RemoteApi, SyncContext, TcpProbe};
use std::sync::Arc;
use std::time::Duration;

/// Config, backend client and sync runtime of the current directory
pub struct Workspace {
    pub config: Config,
    pub remote: Arc<HttpRemote>,
    pub context: SyncContext,
}

impl Workspace {
    /// Open the workspace rooted at the current directory.
    ///
    /// Fails with a config error when `depot init` has not been run.
    pub fn open() -> Result<Self> {
        let root = std::env::current_dir()?;
        if !Config::path_in(&root).exists() {
            return Err(DepotError::ConfigError(format!(
                "no {}/config.toml in {} (run `depot init`)",
                CONFIG_DIR,
                root.display()
            ))
            .into());
        }

        let config = Config::load(&root)?;
        let remote = Arc::new(HttpRemote::new(&config.remote)?);
        let api: Arc<dyn RemoteApi> = remote.clone();
        let context = SyncContext::open(&config, api)?;
        tracing::debug!("Workspace opened at {}", root.display());

        Ok(Self {
            config,
            remote,
            context,
        })
    }

    pub fn probe(&self) -> Result<TcpProbe> {
        Ok(TcpProbe::for_url(
            &self.config.remote.base_url,
            Duration::from_millis(self.config.sync.probe_interval_ms),
            Duration::from_millis(self.config.sync.probe_timeout_ms),
        )?)
    }

    /// Probe the backend once and publish the result to the sync context.
    pub async fn refresh_connectivity(&self, forced_offline: bool) -> Result<bool> {
        let online = if forced_offline {
            false
        } else {
            self.probe()?.probe_once().await
        };
        self.context.connectivity().reporter().report(online);
        Ok(online)
    }
}

pub fn truncate(s: &str, max_width: usize) -> String {
    if s.chars().count() > max_width {
        let cut: String = s.chars().take(max_width.saturating_sub(2)).collect();
        format!("{}..", cut)
    } else {
        s.to_string()
    }
}

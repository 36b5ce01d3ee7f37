//! Application configuration management.
//!
//! Configuration is stored at `~/.config/storefront/config.json`. Missing
//! fields take their defaults, so older files keep loading as settings are
//! added.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::{DEFAULT_REGION, DEFAULT_TOP_FREE_LIMIT, DEFAULT_TOP_GROSSING_LIMIT};
use crate::loader::DEFAULT_BATCH_SIZE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "storefront";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Seconds between reachability probes.
const DEFAULT_REACHABILITY_INTERVAL_SECS: u64 = 10;

pub const REGION_ENV: &str = "STOREFRONT_REGION";
pub const CACHE_DIR_ENV: &str = "STOREFRONT_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub region: String,
    pub top_grossing_limit: usize,
    pub top_free_limit: usize,
    pub batch_size: usize,
    pub reachability_interval_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            top_grossing_limit: DEFAULT_TOP_GROSSING_LIMIT,
            top_free_limit: DEFAULT_TOP_FREE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            reachability_interval_secs: DEFAULT_REACHABILITY_INTERVAL_SECS,
            cache_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents).context("Failed to parse config file")?;
            debug!(path = %path.display(), "Config loaded");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path()?)
    }

    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `STOREFRONT_REGION` / `STOREFRONT_CACHE_DIR` overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(REGION_ENV).ok(),
            std::env::var(CACHE_DIR_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, region: Option<String>, cache_dir: Option<String>) {
        if let Some(region) = region.filter(|r| !r.trim().is_empty()) {
            self.region = region.trim().to_string();
        }
        if let Some(dir) = cache_dir.filter(|d| !d.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Store directory: the override if set, otherwise one per region under
    /// the platform cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(self.region.to_ascii_lowercase()))
    }

    pub fn reachability_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reachability_interval_secs.max(1))
    }
}

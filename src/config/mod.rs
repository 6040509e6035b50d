use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::routing::ExecutionStrategy;

/// Tunables for one router instance. Loaded from
/// `~/.config/museroute/config.toml` when present, otherwise defaults are
/// written there on first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_strategy")]
    pub strategy: ExecutionStrategy,
    /// Minimum capability confidence for first-choice selection.
    #[serde(default = "default_primary_confidence")]
    pub primary_confidence: f32,
    /// Relaxed minimum used when picking a fallback provider.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f32,
    /// Per-assignment provider call timeout.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Concurrency bound under the parallel strategy.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_strategy() -> ExecutionStrategy {
    ExecutionStrategy::Sequential
}

fn default_primary_confidence() -> f32 {
    0.7
}

fn default_fallback_confidence() -> f32 {
    0.6
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            primary_confidence: default_primary_confidence(),
            fallback_confidence: default_fallback_confidence(),
            task_timeout_secs: default_task_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl RouterConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn config_file_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".config").join("museroute").join("config.toml"))
    }
}

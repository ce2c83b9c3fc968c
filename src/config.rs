use crate::engine::EngineConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub tick_interval_ms: u64,
    pub gap_threshold_factor: f64,
    pub suspend_tolerance_secs: u64,
    pub day_check_interval_secs: u64,
    /// 0 makes a locked store fail immediately
    pub busy_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("timekeeper.db"),
            tick_interval_ms: 1000,
            gap_threshold_factor: 1.5,
            suspend_tolerance_secs: 30,
            day_check_interval_secs: 60,
            busy_timeout_ms: 0,
        }
    }
}

impl AppConfig {
    /// Read a JSON config file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("[CONFIG] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config in {}", path.display()))?;
        config.validate()?;
        info!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        anyhow::ensure!(
            self.gap_threshold_factor >= 1.0,
            "gap_threshold_factor must be at least 1.0, got {}",
            self.gap_threshold_factor
        );
        anyhow::ensure!(
            self.engine_config().checked_gap_threshold().is_some(),
            "gap_threshold_factor {} is out of range for a {}ms tick",
            self.gap_threshold_factor,
            self.tick_interval_ms
        );
        anyhow::ensure!(
            self.day_check_interval_secs > 0,
            "day_check_interval_secs must be positive"
        );
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            gap_threshold_factor: self.gap_threshold_factor,
            suspend_tolerance: Duration::from_secs(self.suspend_tolerance_secs),
            day_check_interval: Duration::from_secs(self.day_check_interval_secs),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

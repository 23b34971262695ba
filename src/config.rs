//! Settings loaded from `applyflow.toml`.
//!
//! Missing keys fall back to defaults. `APPLYFLOW_STORAGE_DIR` and
//! `APPLYFLOW_MAX_PER_DAY` take precedence over the file; CLI flags take
//! precedence over both (applied in `main`).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::governor::RateLimits;
use crate::orchestrator::LoopConfig;
use crate::replay::ReplayOptions;

pub const CONFIG_FILE: &str = "applyflow.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding `templates.json` and `applications.json`.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,

    /// Minimum spacing between two recorded applications.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Base for exponential backoff between step retries. 0 retries at once.
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./applyflow-data")
}

fn default_max_per_day() -> u32 {
    50
}

fn default_min_delay_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_error_backoff_secs() -> u64 {
    10
}

fn default_step_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            max_per_day: default_max_per_day(),
            min_delay_secs: default_min_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            retry_backoff_ms: 0,
        }
    }
}

impl AppConfig {
    /// Load `applyflow.toml` from the working directory, if present.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<AppConfig>(&contents)
                .with_context(|| format!("invalid config {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_per_day == 0 {
            bail!("max_per_day must be at least 1");
        }
        self.rate_limits()?;
        Ok(())
    }

    // Takes a lookup function so tests need not touch the process environment.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = var("APPLYFLOW_STORAGE_DIR")
            && !dir.is_empty()
        {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(max) = var("APPLYFLOW_MAX_PER_DAY")
            && !max.is_empty()
        {
            self.max_per_day = max
                .parse()
                .with_context(|| format!("APPLYFLOW_MAX_PER_DAY is not a number: {max}"))?;
        }
        Ok(())
    }

    pub fn templates_path(&self) -> PathBuf {
        self.storage_dir.join("templates.json")
    }

    pub fn applications_path(&self) -> PathBuf {
        self.storage_dir.join("applications.json")
    }

    pub fn rate_limits(&self) -> Result<RateLimits> {
        let min_delay_between_runs = i64::try_from(self.min_delay_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .with_context(|| format!("min_delay_secs out of range: {}", self.min_delay_secs))?;
        Ok(RateLimits {
            max_per_day: self.max_per_day,
            min_delay_between_runs,
        })
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.storage_dir, PathBuf::from("./applyflow-data"));
        assert_eq!(config.max_per_day, 50);
        assert_eq!(config.min_delay_secs, 30);
        assert_eq!(config.retry_backoff_ms, 0);
        assert_eq!(config.rate_limits().unwrap(), RateLimits::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_daily_cap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "max_per_day = 0\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_per_day"));
    }

    #[test]
    fn huge_min_delay_is_an_error() {
        let config = AppConfig {
            min_delay_secs: u64::MAX / 2,
            ..AppConfig::default()
        };
        let err = config.rate_limits().unwrap_err();
        assert!(err.to_string().contains("min_delay_secs"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            max_per_day = 10
            step_timeout_secs = 5
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_per_day, 10);
        assert_eq!(config.replay_options().step_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.loop_config().error_backoff, Duration::from_secs(10));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = AppConfig::default();
        config
            .apply_env(|key| match key {
                "APPLYFLOW_STORAGE_DIR" => Some("/var/lib/applyflow".into()),
                "APPLYFLOW_MAX_PER_DAY" => Some("7".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.templates_path(), PathBuf::from("/var/lib/applyflow/templates.json"));
        assert_eq!(config.max_per_day, 7);
    }

    #[test]
    fn bad_env_number_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == "APPLYFLOW_MAX_PER_DAY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "min_delay_secs = 0\nretry_backoff_ms = 250\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.min_delay_secs, 0);
        assert_eq!(config.replay_options().retry_backoff, Duration::from_millis(250));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "max_per_day = \"many\"").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}

//! Configuration for snapqueue

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::TaskSettings;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Upload and retry configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// History log configuration
    #[serde(default)]
    pub history: HistoryConfig,
    /// Settings template snapshotted into new tasks
    #[serde(default)]
    pub default_task: TaskSettings,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text; missing sections take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.history.save_tasks && self.history.database_path.as_os_str().is_empty() {
            return Err(Error::config("history.database_path must be set when history.save_tasks is enabled"));
        }
        if !(1..=100).contains(&self.default_task.jpeg_quality) {
            return Err(Error::config(format!(
                "default_task.jpeg_quality must be within 1..=100 (got {})",
                self.default_task.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of simultaneously active tasks (0 = unlimited)
    #[serde(default = "default_upload_limit")]
    pub upload_limit: usize,
}

fn default_upload_limit() -> usize { 5 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            upload_limit: default_upload_limit(),
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Retries after a failed upload attempt (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Ask for confirmation above this size in megabytes (0 = never ask)
    #[serde(default)]
    pub large_file_warning_mb: u64,
    /// Use 1024-based megabytes for the warning threshold
    #[serde(default = "default_binary_units")]
    pub binary_units: bool,
}

fn default_max_retries() -> u32 { 1 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_binary_units() -> bool { true }

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            large_file_warning_mb: 0,
            binary_units: default_binary_units(),
        }
    }
}

impl UploadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Size above which an upload needs confirmation, if enabled
    pub fn large_file_threshold(&self) -> Option<u64> {
        if self.large_file_warning_mb == 0 {
            return None;
        }
        let unit = if self.binary_units { 1024 * 1024 } else { 1000 * 1000 };
        Some(self.large_file_warning_mb.saturating_mul(unit))
    }
}

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Append completed tasks to the history database
    #[serde(default = "default_save_tasks")]
    pub save_tasks: bool,
    /// SQLite history database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Number of recent tasks kept in memory
    #[serde(default = "default_recent_tasks_max")]
    pub recent_tasks_max: usize,
}

fn default_save_tasks() -> bool { true }
fn default_recent_tasks_max() -> usize { 10 }

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join("snapqueue")
        .join("history.db")
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            save_tasks: default_save_tasks(),
            database_path: default_database_path(),
            recent_tasks_max: default_recent_tasks_max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.upload_limit, 5);
        assert_eq!(config.upload.max_retries, 1);
        assert_eq!(config.upload.retry_delay(), Duration::from_secs(1));
        assert!(config.upload.large_file_threshold().is_none());
        assert_eq!(config.history.recent_tasks_max, 10);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [scheduler]
            upload_limit = 0

            [upload]
            max_retries = 3
            large_file_warning_mb = 2
            binary_units = false
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.upload_limit, 0);
        assert_eq!(config.upload.max_retries, 3);
        assert_eq!(config.upload.retry_delay_ms, 1000);
        assert_eq!(config.upload.large_file_threshold(), Some(2_000_000));
        assert!(config.history.save_tasks);
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml_str("[scheduler]\nupload_limit = \"many\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_validate_jpeg_quality() {
        let err = AppConfig::from_toml_str("[default_task]\njpeg_quality = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapqueue.toml");
        std::fs::write(&path, "[history]\nsave_tasks = false\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert!(!config.history.save_tasks);
        assert!(AppConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ImportError, Result};

/// Options for a single import run, taken from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub root_path: PathBuf,
    pub credentials_path: PathBuf,
    pub label_name: String,
    pub recursive: bool,
    pub skip_duplicates: bool,
}

/// Tuning file (`gmail-eml-import.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    #[serde(default = "default_quota_units_per_second")]
    pub quota_units_per_second: f64,
    #[serde(default = "default_burst_units")]
    pub burst_units: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota_units_per_second: default_quota_units_per_second(),
            burst_units: default_burst_units(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportConfig {
    #[serde(default = "default_never_mark_spam")]
    pub never_mark_spam: bool,
    #[serde(default)]
    pub process_for_calendar: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            never_mark_spam: default_never_mark_spam(),
            process_for_calendar: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_quota_units_per_second() -> f64 {
    250.0
}

fn default_burst_units() -> f64 {
    500.0
}

fn default_never_mark_spam() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    60
}

const EXAMPLE_CONFIG: &str = r#"# gmail-eml-import tuning file. Every key is optional.

[retry]
# Attempts per network call before the file is recorded as failed
max_attempts = 5
initial_backoff_ms = 500
max_backoff_secs = 30

[rate_limit]
# Gmail allows 250 quota units per user per second; messages.import costs 25
quota_units_per_second = 250.0
burst_units = 500.0

[import]
never_mark_spam = true
process_for_calendar = false
request_timeout_secs = 60
"#;

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ImportError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ImportError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(ImportError::ConfigError(
                "retry.max_attempts must be between 1 and 10".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms == 0 {
            return Err(ImportError::ConfigError(
                "retry.initial_backoff_ms must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff() > self.retry.max_backoff() {
            return Err(ImportError::ConfigError(
                "retry.initial_backoff_ms cannot exceed retry.max_backoff_secs".to_string(),
            ));
        }

        // messages.import costs 25 units; a smaller bucket could never admit one
        if self.rate_limit.burst_units < 25.0 {
            return Err(ImportError::ConfigError(
                "rate_limit.burst_units must be at least 25".to_string(),
            ));
        }
        if self.rate_limit.quota_units_per_second <= 0.0
            || self.rate_limit.quota_units_per_second > 250.0
        {
            return Err(ImportError::ConfigError(
                "rate_limit.quota_units_per_second must be in (0, 250]".to_string(),
            ));
        }

        if self.import.request_timeout_secs == 0 {
            return Err(ImportError::ConfigError(
                "import.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub async fn create_example(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, EXAMPLE_CONFIG).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.retry.max_backoff(), Duration::from_secs(30));
        assert_eq!(config.rate_limit.quota_units_per_second, 250.0);
        assert!(config.import.never_mark_spam);
        assert!(!config.import.process_for_calendar);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ImportError::ConfigError(_))));
    }

    #[test]
    fn test_validation_rejects_too_many_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 11;
        assert!(config.validate().is_err());

        config.retry.max_attempts = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 60_000;
        config.retry.max_backoff_secs = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_tiny_bucket() {
        let mut config = Config::default();
        config.rate_limit.burst_units = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_quota_above_gmail_limit() {
        let mut config = Config::default();
        config.rate_limit.quota_units_per_second = 1000.0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_nonexistent_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("missing.toml")).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_load_partial_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        tokio::fs::write(&path, "[retry]\nmax_attempts = 3\n").await.unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.import, ImportConfig::default());
    }

    #[tokio::test]
    async fn test_load_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[retry\nmax_attempts = ").await.unwrap();

        assert!(matches!(
            Config::load(&path).await,
            Err(ImportError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_create_example_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("example.toml");
        Config::create_example(&path).await.unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config, Config::default());
    }
}

//! Engine configuration
//!
//! Stored in `~/.config/stevedore/config.yaml`. Every field has a default, so
//! a missing file is equivalent to an empty one. The configuration is resolved
//! once at startup (see [`Config::resolve`]) and then passed down explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Image carrying the supervisord binary and assemble helpers
pub const DEFAULT_BOOTSTRAP_IMAGE: &str = "quay.io/openshiftdo/supervisord:0.8.0";

/// Environment variable overriding the bootstrap image
pub const BOOTSTRAP_IMAGE_ENV: &str = "STEVEDORE_BOOTSTRAPPER_IMAGE";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Image used by the supervisord init container
    #[serde(default = "default_bootstrap_image")]
    pub bootstrap_image: String,

    /// Deadlines of the watch-based waits
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Retry policy for conflicting single-volume removals
    #[serde(default)]
    pub conflict_retry: RetryPolicy,
}

fn default_bootstrap_image() -> String {
    DEFAULT_BOOTSTRAP_IMAGE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap_image: default_bootstrap_image(),
            timeouts: Timeouts::default(),
            conflict_retry: RetryPolicy::default(),
        }
    }
}

/// Deadlines for each kind of wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    #[serde(default = "default_rollout_timeout", with = "humantime_serde")]
    pub rollout: Duration,

    #[serde(default = "default_pod_timeout", with = "humantime_serde")]
    pub pod: Duration,

    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub build: Duration,

    #[serde(default = "default_short_timeout", with = "humantime_serde")]
    pub secret: Duration,

    #[serde(default = "default_short_timeout", with = "humantime_serde")]
    pub project: Duration,
}

fn default_rollout_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_pod_timeout() -> Duration {
    Duration::from_secs(240)
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_short_timeout() -> Duration {
    Duration::from_secs(2 * 60)
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            rollout: default_rollout_timeout(),
            pod: default_pod_timeout(),
            build: default_build_timeout(),
            secret: default_short_timeout(),
            project: default_short_timeout(),
        }
    }
}

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff() -> Duration {
    Duration::from_millis(10)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given (1-based) retry attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Config {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("stevedore").join("config.yaml"))
    }

    /// Load (from `path` or the default location) and apply environment overrides
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(image) = lookup(BOOTSTRAP_IMAGE_ENV).filter(|v| !v.is_empty()) {
            tracing::debug!(image = %image, "bootstrap image overridden from environment");
            self.bootstrap_image = image;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.bootstrap_image.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "bootstrapImage must not be blank".to_string(),
            });
        }
        if self.conflict_retry.max_attempts == 0 {
            return Err(CoreError::InvalidConfig {
                message: "conflictRetry.maxAttempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bootstrap_image, DEFAULT_BOOTSTRAP_IMAGE);
        assert_eq!(config.timeouts.rollout, Duration::from_secs(300));
        assert_eq!(config.timeouts.pod, Duration::from_secs(240));
        assert_eq!(config.conflict_retry.max_attempts, 5);
    }

    #[test]
    fn test_partial_yaml() {
        let config = Config::from_yaml(
            r#"
bootstrapImage: registry.local/supervisord:1.0
timeouts:
  rollout: 90s
conflictRetry:
  maxAttempts: 3
  backoff: 250ms
"#,
        )
        .unwrap();

        assert_eq!(config.bootstrap_image, "registry.local/supervisord:1.0");
        assert_eq!(config.timeouts.rollout, Duration::from_secs(90));
        assert_eq!(config.timeouts.pod, Duration::from_secs(240));
        assert_eq!(config.conflict_retry.backoff, Duration::from_millis(250));
        assert_eq!(config.conflict_retry.delay_for(2), Duration::from_millis(500));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_validation() {
        assert!(Config::from_yaml("bootstrapImage: ''").is_err());
        assert!(Config::from_yaml("conflictRetry:\n  maxAttempts: 0").is_err());
    }

    #[test]
    fn test_env_override() {
        let config = Config::default().with_overrides(|key| {
            (key == BOOTSTRAP_IMAGE_ENV).then(|| "example/supervisord:dev".to_string())
        });
        assert_eq!(config.bootstrap_image, "example/supervisord:dev");

        let untouched = Config::default().with_overrides(|_| Some(String::new()));
        assert_eq!(untouched.bootstrap_image, DEFAULT_BOOTSTRAP_IMAGE);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "timeouts:\n  build: 1h\n").unwrap();

        let config = Config::resolve(Some(&path)).unwrap();
        assert_eq!(config.timeouts.build, Duration::from_secs(3600));
    }
}

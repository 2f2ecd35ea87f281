//! Monitor configuration
//!
//! Loaded once from YAML at startup and validated before anything is
//! scheduled. Unknown keys are rejected so that a typo cannot silently fall
//! back to a default.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::alerts::NotifyTarget;
use crate::monitor::{Endpoint, DEFAULT_ACCEPTED_STATUS_CODES};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "PINGWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/pingwatch.yaml";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_CHECK_INTERVAL_SECS: u64 = 7 * 24 * 3600;
const MAX_SHUTDOWN_GRACE_SECS: u64 = 3600;
const MAX_PRUNE_AFTER_DAYS: u64 = 36500;

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default seconds between checks for monitors that do not set their own
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Directory holding persisted endpoint state
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Seconds an in-flight probe may keep running after shutdown is requested
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
    /// Drop state for endpoints not checked for this many days (0 disables)
    #[serde(default = "default_prune_after_days")]
    pub prune_after_days: u64,
    #[serde(default = "default_notify")]
    pub notify: Vec<NotifyTarget>,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
}

/// One monitored URL
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Seconds between checks; falls back to the global interval
    #[serde(default)]
    pub check_interval: Option<u64>,
    #[serde(default)]
    pub expected_status_codes: Option<Vec<u16>>,
}

/// Status API listener
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./pingwatch_state")
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_prune_after_days() -> u64 {
    30
}

fn default_notify() -> Vec<NotifyTarget> {
    vec![NotifyTarget::Log]
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    9090
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and logical consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval == 0 {
            return Err(ConfigError::Invalid(
                "Global check interval must be positive".to_string(),
            ));
        }
        if self.check_interval > MAX_CHECK_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "Global check interval must be at most {} seconds",
                MAX_CHECK_INTERVAL_SECS
            )));
        }
        if self.shutdown_grace > MAX_SHUTDOWN_GRACE_SECS {
            return Err(ConfigError::Invalid(format!(
                "Shutdown grace must be at most {} seconds",
                MAX_SHUTDOWN_GRACE_SECS
            )));
        }
        if self.prune_after_days > MAX_PRUNE_AFTER_DAYS {
            return Err(ConfigError::Invalid(format!(
                "prune_after_days must be at most {}",
                MAX_PRUNE_AFTER_DAYS
            )));
        }
        if self.monitors.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one monitor configuration is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, monitor) in self.monitors.iter().enumerate() {
            let invalid = |msg: &str| ConfigError::Invalid(format!("Monitor {}: {}", i, msg));

            if monitor.url.trim().is_empty() {
                return Err(invalid("URL is required"));
            }
            let url = Url::parse(&monitor.url)
                .map_err(|e| invalid(&format!("URL is not valid ({})", e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid("URL must start with http:// or https://"));
            }
            if url.host_str().is_none() {
                return Err(invalid("URL must include a host"));
            }
            if monitor.timeout == 0 {
                return Err(invalid("Timeout must be positive"));
            }
            if monitor.timeout > MAX_TIMEOUT_SECS {
                return Err(invalid(&format!(
                    "Timeout must be at most {} seconds",
                    MAX_TIMEOUT_SECS
                )));
            }
            if monitor.check_interval == Some(0) {
                return Err(invalid("Check interval must be positive"));
            }
            if monitor.check_interval.is_some_and(|secs| secs > MAX_CHECK_INTERVAL_SECS) {
                return Err(invalid(&format!(
                    "Check interval must be at most {} seconds",
                    MAX_CHECK_INTERVAL_SECS
                )));
            }
            if let Some(codes) = &monitor.expected_status_codes {
                if codes.is_empty() {
                    return Err(invalid("Expected status codes must not be empty"));
                }
                if let Some(code) = codes.iter().find(|c| !(100..=599).contains(*c)) {
                    return Err(invalid(&format!("Status code {} is not a valid HTTP status", code)));
                }
            }
            if !seen.insert(monitor.url.as_str()) {
                return Err(invalid("Duplicate URL"));
            }
        }

        for target in &self.notify {
            if let NotifyTarget::Webhook { url, .. } = target {
                Url::parse(url).map_err(|e| {
                    ConfigError::Invalid(format!("Webhook URL {} is not valid ({})", url, e))
                })?;
            }
        }

        Ok(())
    }

    /// Build the endpoint list, applying defaults
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.monitors
            .iter()
            .map(|monitor| {
                let interval = monitor.check_interval.unwrap_or(self.check_interval);
                let codes = monitor
                    .expected_status_codes
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ACCEPTED_STATUS_CODES.to_vec());

                Endpoint::new(monitor.url.clone())
                    .with_timeout(Duration::from_secs(monitor.timeout))
                    .with_check_interval(Duration::from_secs(interval))
                    .with_accepted_status_codes(codes)
            })
            .collect()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    /// Maximum age of a state record before pruning, if pruning is enabled
    pub fn prune_after(&self) -> Option<chrono::Duration> {
        (self.prune_after_days > 0).then(|| chrono::Duration::days(self.prune_after_days as i64))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
check_interval: 120
state_dir: /var/lib/pingwatch
notify:
  - type: log
  - type: webhook
    url: https://hooks.example.com/alerts
    headers:
      Authorization: Bearer abc
api:
  port: 8088
monitors:
  - url: https://example.com
  - url: https://api.example.com/health
    timeout: 5
    check_interval: 60
    expected_status_codes: [200]
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.monitors.len(), 2);
        assert_eq!(config.notify.len(), 2);
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/pingwatch"));
        let api = config.api.as_ref().unwrap();
        assert_eq!(api.host, "127.0.0.1");
        assert_eq!(api.port, 8088);

        let endpoints = config.endpoints();
        assert_eq!(endpoints[0].check_interval, Duration::from_secs(120));
        assert_eq!(endpoints[0].timeout, Duration::from_secs(30));
        assert!(endpoints[0].accepts(202));

        assert_eq!(endpoints[1].check_interval, Duration::from_secs(60));
        assert_eq!(endpoints[1].timeout, Duration::from_secs(5));
        assert!(!endpoints[1].accepts(202));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("monitors:\n  - url: http://localhost:8080/\n").unwrap();
        assert_eq!(config.check_interval, 300);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(config.prune_after(), Some(chrono::Duration::days(30)));
        assert_eq!(config.notify, vec![NotifyTarget::Log]);
        assert!(config.api.is_none());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = Config::from_yaml("monitors:\n  - url: https://a.example\n    timout: 5\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_empty_monitors() {
        let err = Config::from_yaml("check_interval: 60\n").unwrap_err();
        assert!(err.to_string().contains("At least one monitor"));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let err = Config::from_yaml("monitors:\n  - url: ftp://a.example\n").unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));
    }

    #[test]
    fn test_rejects_zero_timeout_and_interval() {
        let err = Config::from_yaml("monitors:\n  - url: https://a.example\n    timeout: 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("Timeout must be positive"));

        let err =
            Config::from_yaml("monitors:\n  - url: https://a.example\n    check_interval: 0\n")
                .unwrap_err();
        assert!(err.to_string().contains("Check interval must be positive"));
    }

    #[test]
    fn test_rejects_oversized_durations() {
        let err = Config::from_yaml(
            "monitors:\n  - url: https://a.example\n    timeout: 18446744073709551615\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Monitor 0: Timeout must be at most 3600 seconds"));

        let err = Config::from_yaml(
            "monitors:\n  - url: https://a.example\n    check_interval: 99999999\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Check interval must be at most"));

        let err = Config::from_yaml(
            "prune_after_days: 18446744073709551615\nmonitors:\n  - url: https://a.example\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("prune_after_days"));
    }

    #[test]
    fn test_rejects_duplicate_urls() {
        let err = Config::from_yaml(
            "monitors:\n  - url: https://a.example\n  - url: https://a.example\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Monitor 1: Duplicate URL"));
    }

    #[test]
    fn test_rejects_invalid_status_codes() {
        let err = Config::from_yaml(
            "monitors:\n  - url: https://a.example\n    expected_status_codes: [200, 999]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

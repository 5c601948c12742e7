//! Agent configuration
//!
//! Defines the process-wide settings: where the queue configuration lives,
//! how often to poll, and how long a backend call may take.

use std::path::PathBuf;
use std::time::Duration;

use crate::service::CallLimits;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this agent instance
    pub harvester_id: String,

    /// JSON file mapping queue names to site configuration
    pub queue_config_path: PathBuf,

    /// How often to run a submission and monitoring cycle
    pub poll_interval: Duration,

    /// Upper bound for a single backend call
    pub call_timeout: Duration,

    /// Maximum number of backend calls in flight at once
    pub max_concurrent_calls: usize,

    /// Where output archives are downloaded and unpacked
    pub artifact_dir: PathBuf,

    /// Public URL prefix under which `artifact_dir` is served
    pub log_base_url: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(harvester_id: String, queue_config_path: PathBuf) -> Self {
        Self {
            harvester_id,
            queue_config_path,
            poll_interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(60),
            max_concurrent_calls: 4,
            artifact_dir: PathBuf::from("/data/boinc/logs"),
            log_base_url: default_log_base_url(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - QUEUE_CONFIG (optional, default: queue_config.json)
    /// - HARVESTER_ID (optional, default: random UUID)
    /// - POLL_INTERVAL (optional, seconds, default: 60)
    /// - CALL_TIMEOUT (optional, seconds, default: 60)
    /// - MAX_CONCURRENT_CALLS (optional, default: 4)
    /// - ARTIFACT_DIR (optional, default: /data/boinc/logs)
    /// - LOG_BASE_URL (optional, default: https://<HOSTNAME>)
    pub fn from_env() -> anyhow::Result<Self> {
        let queue_config_path = std::env::var("QUEUE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("queue_config.json"));

        let harvester_id = std::env::var("HARVESTER_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let mut config = Self::new(harvester_id, queue_config_path);

        if let Some(secs) = env_u64("POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("CALL_TIMEOUT") {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = env_u64("MAX_CONCURRENT_CALLS") {
            config.max_concurrent_calls = limit as usize;
        }
        if let Ok(dir) = std::env::var("ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("LOG_BASE_URL") {
            config.log_base_url = url;
        }

        Ok(config)
    }

    /// Limits applied to every backend call
    pub fn call_limits(&self) -> CallLimits {
        CallLimits {
            timeout: self.call_timeout,
            max_concurrent: self.max_concurrent_calls,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.harvester_id.is_empty() {
            anyhow::bail!("harvester_id cannot be empty");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.call_timeout.is_zero() {
            anyhow::bail!("call_timeout must be greater than 0");
        }

        if self.max_concurrent_calls == 0 {
            anyhow::bail!("max_concurrent_calls must be greater than 0");
        }

        if !self.log_base_url.starts_with("http://") && !self.log_base_url.starts_with("https://")
        {
            anyhow::bail!("log_base_url must start with http:// or https://");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            PathBuf::from("queue_config.json"),
        )
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

fn default_log_base_url() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("https://{}", host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_calls, 4);
        assert!(config.log_base_url.starts_with("https://"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.harvester_id = String::new();
        assert!(config.validate().is_err());
        config.harvester_id = "harvester-1".to_string();

        config.max_concurrent_calls = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_calls = 1;

        config.log_base_url = "boinc-logs".to_string();
        assert!(config.validate().is_err());

        config.log_base_url = "https://harvester.example.org/logs".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_call_limits() {
        let mut config = Config::default();
        config.call_timeout = Duration::from_secs(5);
        config.max_concurrent_calls = 8;

        let limits = config.call_limits();
        assert_eq!(limits.timeout, Duration::from_secs(5));
        assert_eq!(limits.max_concurrent, 8);
    }
}

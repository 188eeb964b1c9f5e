//! Configuration for the tile downloader
//!
//! The downloader is configured once at construction. Everything here is
//! read-only afterwards and shared by all workers.

use crate::core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_WORKERS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_TRANSFER_SIZE_LIMIT, DEFAULT_USER_AGENT,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Maximum concurrent tile downloads
    pub max_workers: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Payloads above this many bytes get shrunk before delivery.
    /// `None` turns the shrinking pass off for transports without a size limit.
    pub transfer_size_limit: Option<usize>,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            transfer_size_limit: Some(DEFAULT_TRANSFER_SIZE_LIMIT),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Configuration presets
impl DownloaderConfig {
    pub fn low_resource() -> Self {
        Self {
            max_workers: 2,
            ..Self::default()
        }
    }

    pub fn high_performance() -> Self {
        Self {
            max_workers: 16,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            max_workers: 2,
            connect_timeout_ms: 500,
            read_timeout_ms: 500,
            ..Self::default()
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_transfer_size_limit(mut self, limit: Option<usize>) -> Self {
        self.transfer_size_limit = limit;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        if self.transfer_size_limit == Some(0) {
            return Err(Error::Config(
                "transfer_size_limit must be non-zero, use null to disable it".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.read_timeout(), Duration::from_millis(5000));
        assert_eq!(config.transfer_size_limit, Some(300_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = DownloaderConfig::from_json_str(r#"{ "max_workers": 8 }"#).unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.read_timeout_ms, 5000);

        let config = DownloaderConfig::from_json_str(r#"{ "transfer_size_limit": null }"#).unwrap();
        assert_eq!(config.transfer_size_limit, None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            DownloaderConfig::from_json_str(r#"{ "max_workers": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DownloaderConfig::from_json_str(r#"{ "read_timeout_ms": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DownloaderConfig::from_json_str("not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_workers": 3, "user_agent": "test-agent" }}"#).unwrap();

        let config = DownloaderConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.user_agent, "test-agent");
    }
}

//! Store configuration
//!
//! Precedence, lowest first: [`StoreConfig::default`], a YAML file, then
//! `KGSTORE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::persistence::{StorageError, StorageResult};

/// Bounded retry applied to write conflicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles on each further retry
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based; attempt 1 has none)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << shift))
    }
}

/// Configuration of a knowledge-graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the RocksDB database
    pub path: PathBuf,
    /// Concurrent connection slots
    pub pool_size: usize,
    /// How long `open` waits for a slot; `None` waits forever
    pub pool_timeout_ms: Option<u64>,
    pub create_if_missing: bool,
    /// RocksDB write buffer size in MiB
    pub write_buffer_mb: usize,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kgstore_data"),
            pool_size: 4,
            pool_timeout_ms: None,
            create_if_missing: true,
            write_buffer_mb: 64,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `path`
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> StorageResult<Self> {
        let config: StoreConfig =
            serde_yaml::from_str(yaml).map_err(|e| StorageError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Load from `KGSTORE_CONFIG` if set, then apply env overrides
    pub fn from_env() -> StorageResult<Self> {
        let mut config = match std::env::var("KGSTORE_CONFIG") {
            Ok(file) if !file.trim().is_empty() => Self::from_yaml_file(file)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("KGSTORE_PATH") {
            if !value.trim().is_empty() {
                self.path = PathBuf::from(value);
            }
        }
        if let Some(value) = lookup("KGSTORE_POOL_SIZE") {
            if let Ok(parsed) = value.parse() {
                self.pool_size = parsed;
            }
        }
        if let Some(value) = lookup("KGSTORE_POOL_TIMEOUT_MS") {
            if let Ok(parsed) = value.parse() {
                self.pool_timeout_ms = Some(parsed);
            }
        }
        if let Some(value) = lookup("KGSTORE_RETRY_MAX_ATTEMPTS") {
            if let Ok(parsed) = value.parse() {
                self.retry.max_attempts = parsed;
            }
        }
        if let Some(value) = lookup("KGSTORE_RETRY_BACKOFF_MS") {
            if let Ok(parsed) = value.parse() {
                self.retry.backoff_ms = parsed;
            }
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.pool_size == 0 {
            return Err(StorageError::Config("pool_size must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(StorageError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pool_timeout(&self) -> Option<Duration> {
        self.pool_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config = StoreConfig::from_yaml_str("path: /tmp/kg\npool_size: 8\n").unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/kg"));
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_yaml_nested_retry() {
        let yaml = "retry:\n  max_attempts: 2\n  backoff_ms: 1\npool_timeout_ms: 50\n";
        let config = StoreConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.pool_timeout(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = StoreConfig::from_yaml_str("pool_size: [1, 2]").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let err = StoreConfig::from_yaml_str("pool_size: 0").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));

        let mut config = StoreConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KGSTORE_PATH", "/data/kg"),
            ("KGSTORE_POOL_SIZE", "16"),
            ("KGSTORE_RETRY_BACKOFF_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = StoreConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.path, PathBuf::from("/data/kg"));
        assert_eq!(config.pool_size, 16);
        // unparsable values are ignored
        assert_eq!(config.retry.backoff_ms, RetryPolicy::default().backoff_ms);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_ms: 10,
        };
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_millis(10));
        assert_eq!(policy.delay_for(3), Duration::from_millis(20));
        assert_eq!(policy.delay_for(4), Duration::from_millis(40));
    }
}

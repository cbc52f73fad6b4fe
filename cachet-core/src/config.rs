//! Configuration types

use crate::{CachetError, CachetResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of entries the eviction sweep keeps when nothing else is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Default LMDB map size in megabytes.
pub const DEFAULT_MAP_SIZE_MB: usize = 64;

/// Master configuration for the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachetConfig {
    /// How many of the most recently written entries survive an eviction sweep.
    pub max_entries: usize,
    /// Directory of the LMDB store. `None` keeps responses in memory only.
    pub store_path: Option<PathBuf>,
    /// LMDB map size in megabytes.
    pub map_size_mb: usize,
    /// Whether newly constructed requests are cacheable.
    pub cache_by_default: bool,
}

impl Default for CachetConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            store_path: None,
            map_size_mb: DEFAULT_MAP_SIZE_MB,
            cache_by_default: true,
        }
    }
}

impl CachetConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHET_MAX_ENTRIES`: entries kept by the eviction sweep (default: 10)
    /// - `CACHET_STORE_PATH`: LMDB directory (default: in-memory store)
    /// - `CACHET_MAP_SIZE_MB`: LMDB map size (default: 64)
    /// - `CACHET_CACHE_BY_DEFAULT`: "true" or "false" (default: true)
    ///
    /// Unparseable values are reported rather than silently replaced.
    pub fn from_env() -> CachetResult<Self> {
        let defaults = Self::default();

        let max_entries = parse_env("CACHET_MAX_ENTRIES")?.unwrap_or(defaults.max_entries);
        let map_size_mb = parse_env("CACHET_MAP_SIZE_MB")?.unwrap_or(defaults.map_size_mb);
        let store_path = std::env::var("CACHET_STORE_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let cache_by_default = std::env::var("CACHET_CACHE_BY_DEFAULT")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.cache_by_default);

        let config = Self {
            max_entries,
            store_path,
            map_size_mb,
            cache_by_default,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the number of entries kept by the eviction sweep.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Persist responses in an LMDB store at `path`.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Set the LMDB map size.
    pub fn with_map_size_mb(mut self, size: usize) -> Self {
        self.map_size_mb = size;
        self
    }

    /// Set whether new requests start out cacheable.
    pub fn with_cache_by_default(mut self, enabled: bool) -> Self {
        self.cache_by_default = enabled;
        self
    }

    /// LMDB map size in bytes, or `None` if it does not fit in `usize`.
    pub fn map_size_bytes(&self) -> Option<usize> {
        self.map_size_mb.checked_mul(1024 * 1024)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_entries > 0
    /// - map_size_mb > 0 and its size in bytes fits in `usize`
    pub fn validate(&self) -> CachetResult<()> {
        if self.max_entries == 0 {
            return Err(CachetError::Config(ConfigError::InvalidValue {
                field: "max_entries".to_string(),
                value: self.max_entries.to_string(),
                reason: "max_entries must be greater than 0".to_string(),
            }));
        }

        if self.map_size_mb == 0 {
            return Err(CachetError::Config(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "map_size_mb must be greater than 0".to_string(),
            }));
        }

        if self.map_size_bytes().is_none() {
            return Err(CachetError::Config(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "map size in bytes overflows usize".to_string(),
            }));
        }

        Ok(())
    }
}

fn parse_env(name: &str) -> CachetResult<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<usize>().map(Some).map_err(|e| {
            CachetError::Config(ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CachetConfig::default();
        assert_eq!(config.max_entries, 10);
        assert!(config.store_path.is_none());
        assert!(config.cache_by_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CachetConfig::new()
            .with_max_entries(25)
            .with_store_path("/tmp/cachet")
            .with_map_size_mb(16)
            .with_cache_by_default(false);

        assert_eq!(config.max_entries, 25);
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/cachet")));
        assert_eq!(config.map_size_mb, 16);
        assert!(!config.cache_by_default);
    }

    #[test]
    fn test_validate_rejects_zero_entries() {
        let err = CachetConfig::new()
            .with_max_entries(0)
            .validate()
            .expect_err("zero entries should be rejected");
        assert!(matches!(
            err,
            CachetError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "max_entries"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_map_size() {
        let err = CachetConfig::new()
            .with_map_size_mb(0)
            .validate()
            .expect_err("zero map size should be rejected");
        assert!(matches!(
            err,
            CachetError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "map_size_mb"
        ));
    }

    #[test]
    fn test_validate_rejects_overflowing_map_size() {
        let config = CachetConfig::new().with_map_size_mb(usize::MAX);
        assert!(config.map_size_bytes().is_none());

        let err = config
            .validate()
            .expect_err("overflowing map size should be rejected");
        assert!(matches!(
            err,
            CachetError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "map_size_mb"
        ));
        assert_eq!(CachetConfig::new().with_map_size_mb(2).map_size_bytes(), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = CachetConfig::new().with_store_path("/var/cache/cachet");
        let json = serde_json::to_string(&config).expect("serialize");
        let back: CachetConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}

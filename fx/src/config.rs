//! Engine and cache configuration.

use chrono::Duration;
use ratekeeper_common::constants;

/// Configuration for an [`crate::ExpiringCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of every cached entry.
    pub ttl: Duration,
    /// Maximum number of entries. `None` leaves the cache unbounded.
    pub max_entries: Option<usize>,
    /// Serve concurrent misses on one key from a single fetch.
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: constants::default_cache_ttl(),
            max_entries: None,
            coalesce_misses: false,
        }
    }
}

impl CacheConfig {
    /// Create a config with the given TTL in milliseconds.
    pub fn with_ttl_ms(ttl_ms: i64) -> Self {
        Self {
            ttl: ttl_from_ms(ttl_ms),
            ..Default::default()
        }
    }
}

/// `i64::MIN` is the one millisecond count a [`Duration`] cannot hold.
fn ttl_from_ms(ttl_ms: i64) -> Duration {
    Duration::try_milliseconds(ttl_ms).unwrap_or(Duration::MIN)
}

/// Configuration for the FX engine.
#[derive(Debug, Clone, Default)]
pub struct FxEngineConfig {
    /// Cache configuration, shared by every key family.
    pub cache: CacheConfig,
}

impl FxEngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ttl) = std::env::var("FX_CACHE_TTL_MS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                config.cache.ttl = ttl_from_ms(ttl);
            }
        }

        if let Ok(max) = std::env::var("FX_CACHE_MAX_ENTRIES") {
            if let Ok(max) = max.parse() {
                config.cache.max_entries = Some(max);
            }
        }

        if let Ok(coalesce) = std::env::var("FX_CACHE_COALESCE_MISSES") {
            if let Ok(coalesce) = coalesce.parse() {
                config.cache.coalesce_misses = coalesce;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache.ttl <= Duration::zero() {
            return Err("Cache TTL must be positive".to_string());
        }

        if self.cache.max_entries == Some(0) {
            return Err("Cache max entries cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FxEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl, Duration::milliseconds(60_000));
        assert_eq!(config.cache.max_entries, None);
        assert!(!config.cache.coalesce_misses);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = FxEngineConfig::default();
        config.cache.ttl = Duration::zero();
        assert!(config.validate().is_err());

        let mut config = FxEngineConfig::default();
        config.cache.max_entries = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_ttl_ms() {
        let config = CacheConfig::with_ttl_ms(250);
        assert_eq!(config.ttl, Duration::milliseconds(250));
        assert!(!config.coalesce_misses);
    }

    #[test]
    fn test_ttl_extremes() {
        let longest = FxEngineConfig {
            cache: CacheConfig::with_ttl_ms(i64::MAX),
        };
        assert!(longest.validate().is_ok());

        let shortest = FxEngineConfig {
            cache: CacheConfig::with_ttl_ms(i64::MIN),
        };
        assert!(shortest.validate().is_err());
    }
}

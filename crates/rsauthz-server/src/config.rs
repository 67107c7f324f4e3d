//! Configuration management for the rsauthz service.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rsauthz_server::config::ServiceConfig;
//!
//! // Load from file with env overrides
//! let config = ServiceConfig::load("rsauthz.yaml")?;
//!
//! // Or load from environment only
//! let config = ServiceConfig::from_env()?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use rsauthz_domain::{DecisionCache, DecisionCacheConfig, ResolverConfig};
use serde::{Deserialize, Serialize};

use crate::logging::{LogFormat, LoggingConfig};

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Decision cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Permission engine settings
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Decision cache settings.
///
/// Environment variables:
/// - `RSAUTHZ_CACHE__ENABLED=true` - Enable decision caching
/// - `RSAUTHZ_CACHE__MAX_CAPACITY=50000` - Maximum cached decisions
/// - `RSAUTHZ_CACHE__TTL_SECS=10` - Default entry TTL
///
/// # Example YAML Configuration
///
/// ```yaml
/// cache:
///   enabled: true
///   max_capacity: 100000
///   ttl_secs: 30
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Enable the decision cache.
    ///
    /// Disabled by default: only enable when every grant mutation goes
    /// through `GrantAdministration`, which invalidates after commit.
    #[serde(default)]
    pub enabled: bool,

    /// Maximum number of cached decisions (LRU beyond this).
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,

    /// Default TTL for cached decisions, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_capacity() -> u64 {
    100_000
}

fn default_cache_ttl() -> u64 {
    30
}

/// Permission engine settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Upper bound on a single grant store query, in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout(),
        }
    }
}

fn default_store_timeout() -> u64 {
    5_000
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type. Only "memory" is built in.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Environment variable prefix; `__` separates nested keys.
const ENV_PREFIX: &str = "RSAUTHZ";

impl ServiceConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RSAUTHZ_` and use `__` as separator.
    /// For example:
    /// - `RSAUTHZ_CACHE__ENABLED=true` overrides `cache.enabled`
    /// - `RSAUTHZ_LOGGING__LEVEL=debug` overrides `logging.level`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServiceConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let service_config: ServiceConfig = config.try_deserialize()?;
        service_config.validate()?;

        Ok(service_config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Uses default values and allows overrides via RSAUTHZ_ prefixed env vars.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServiceConfig::default())?)
            .add_source(environment())
            .build()?;

        let service_config: ServiceConfig = config.try_deserialize()?;
        service_config.validate()?;

        Ok(service_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.cache.max_capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.max_capacity must be greater than 0".to_string(),
            });
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.ttl_secs must be greater than 0".to_string(),
            });
        }

        if self.resolver.store_timeout_ms == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "resolver.store_timeout_ms must be greater than 0".to_string(),
            });
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Decision cache configuration derived from these settings.
    pub fn decision_cache_config(&self) -> DecisionCacheConfig {
        DecisionCacheConfig::default()
            .with_enabled(self.cache.enabled)
            .with_max_capacity(self.cache.max_capacity)
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
    }

    /// Engine configuration derived from these settings.
    ///
    /// A cache is attached only when caching is enabled.
    pub fn resolver_config(&self) -> ResolverConfig {
        let config = ResolverConfig::default()
            .with_store_timeout(Duration::from_millis(self.resolver.store_timeout_ms));
        if self.cache.enabled {
            config.with_cache(Arc::new(DecisionCache::new(self.decision_cache_config())))
        } else {
            config
        }
    }

    /// Logging configuration derived from these settings.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.to_lowercase(),
            format: if self.logging.json {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            ..LoggingConfig::default()
        }
    }
}

fn environment() -> Environment {
    // RSAUTHZ_CACHE__ENABLED -> cache.enabled
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

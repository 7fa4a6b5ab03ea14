//! Cache Configuration
//!
//! Settings for the Redis build cache. Every field has a built-in default
//! that can be overridden by a process-wide property:
//!
//! | Property                     | Default     |
//! |------------------------------|-------------|
//! | `build_cache.redis.host`     | `localhost` |
//! | `build_cache.redis.port`     | `6379`      |
//! | `build_cache.redis.password` | none        |
//! | `build_cache.redis.ttl`      | `14400` (minutes, 10 days) |
//!
//! Integer properties that do not parse fall back to the built-in default.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

// =============================================================================
// Property Names and Defaults
// =============================================================================

pub const HOST_PROPERTY: &str = "build_cache.redis.host";
pub const PORT_PROPERTY: &str = "build_cache.redis.port";
pub const PASSWORD_PROPERTY: &str = "build_cache.redis.password";
pub const TTL_PROPERTY: &str = "build_cache.redis.ttl";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
/// 10 days, in minutes
pub const DEFAULT_TIME_TO_LIVE: u32 = 10 * 24 * 60;

// =============================================================================
// Property Sources
// =============================================================================

/// A table of process-wide properties
pub trait PropertySource {
    fn property(&self, name: &str) -> Option<String>;
}

/// Properties read from the environment
///
/// `build_cache.redis.ttl` is looked up as `BUILD_CACHE_REDIS_TTL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProperties;

impl SystemProperties {
    pub fn env_name(property: &str) -> String {
        property.replace('.', "_").to_ascii_uppercase()
    }
}

impl PropertySource for SystemProperties {
    fn property(&self, name: &str) -> Option<String> {
        std::env::var(Self::env_name(name)).ok()
    }
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Parse an integer override, falling back to `default` when absent or invalid
pub fn int_property<T: FromStr>(value: Option<&str>, default: T) -> T {
    value
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// Redis Cache Config
// =============================================================================

/// Configuration of the Redis build cache
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisCacheConfig {
    /// Redis host
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Shared password; None = no authentication
    pub password: Option<String>,
    /// Time to live of cached artifacts in minutes
    #[serde(alias = "ttl")]
    pub time_to_live: u32,
    /// Whether the host should use this cache at all
    pub enabled: bool,
    /// Whether the host uploads artifacts, not only downloads them
    pub push: bool,
}

impl RedisCacheConfig {
    /// Defaults with overrides from `properties`
    pub fn from_properties(properties: &impl PropertySource) -> Self {
        Self {
            host: properties
                .property(HOST_PROPERTY)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: int_property(properties.property(PORT_PROPERTY).as_deref(), DEFAULT_PORT),
            password: properties.property(PASSWORD_PROPERTY),
            time_to_live: int_property(
                properties.property(TTL_PROPERTY).as_deref(),
                DEFAULT_TIME_TO_LIVE,
            ),
            enabled: true,
            push: false,
        }
    }

    /// Load from a YAML file; missing fields take the property defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Time to live in seconds, as written to Redis
    pub fn time_to_live_seconds(&self) -> u64 {
        u64::from(self.time_to_live) * 60
    }

    /// Reject settings Redis cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Configuration("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Configuration("port must be between 1 and 65535".into()));
        }
        if self.time_to_live == 0 {
            return Err(Error::Configuration(
                "time to live must be at least one minute".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self::from_properties(&SystemProperties)
    }
}

impl std::fmt::Debug for RedisCacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<password given>"))
            .field("time_to_live", &self.time_to_live)
            .field("enabled", &self.enabled)
            .field("push", &self.push)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = RedisCacheConfig::from_properties(&HashMap::new());
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert_eq!(config.password, None);
        assert_eq!(config.time_to_live, 14400);
        assert!(config.enabled);
        assert!(!config.push);
    }

    #[test]
    fn test_property_overrides() {
        let config = RedisCacheConfig::from_properties(&props(&[
            (HOST_PROPERTY, "cache.internal"),
            (PORT_PROPERTY, "6380"),
            (PASSWORD_PROPERTY, "s3cret"),
            (TTL_PROPERTY, "60"),
        ]));
        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.port, 6380);
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert_eq!(config.time_to_live, 60);
        assert_eq!(config.time_to_live_seconds(), 3600);
    }

    #[test]
    fn test_invalid_integer_overrides_fall_back() {
        let config = RedisCacheConfig::from_properties(&props(&[
            (PORT_PROPERTY, "http"),
            (TTL_PROPERTY, "notanumber"),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.time_to_live, 14400);
        assert_eq!(config.time_to_live_seconds(), 864_000);

        assert_eq!(int_property(Some("-5"), 14400u32), 14400);
        assert_eq!(int_property(Some(" 42 "), 14400u32), 42);
        assert_eq!(int_property::<u16>(Some("70000"), 6379), 6379);
        assert_eq!(int_property::<u32>(None, 7), 7);
    }

    #[test]
    fn test_env_names() {
        assert_eq!(SystemProperties::env_name(TTL_PROPERTY), "BUILD_CACHE_REDIS_TTL");
        assert_eq!(SystemProperties::env_name(HOST_PROPERTY), "BUILD_CACHE_REDIS_HOST");
    }

    #[test]
    fn test_yaml_fields() {
        let config = RedisCacheConfig::from_yaml(
            "host: redis.ci\nport: 7000\npassword: pw\ntimeToLive: 30\npush: true\n",
        )
        .unwrap();
        assert_eq!(config.host, "redis.ci");
        assert_eq!(config.port, 7000);
        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.time_to_live, 30);
        assert!(config.push);
        assert!(config.enabled);

        let config = RedisCacheConfig::from_yaml("ttl: 5\n").unwrap();
        assert_eq!(config.time_to_live, 5);
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host: from-file").unwrap();
        writeln!(file, "enabled: false").unwrap();

        let config = RedisCacheConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.host, "from-file");
        assert!(!config.enabled);
    }

    #[test]
    fn test_bad_yaml_is_a_configuration_error() {
        let err = RedisCacheConfig::from_yaml("port: [1, 2]").unwrap_err();
        assert_matches!(err, Error::YamlParse(_));
    }

    #[test]
    fn test_validate() {
        let mut config = RedisCacheConfig::from_properties(&HashMap::new());
        assert!(config.validate().is_ok());

        config.time_to_live = 0;
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        config.time_to_live = 1;
        config.port = 0;
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        config.port = 1;
        config.host = " ".into();
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = RedisCacheConfig::from_properties(&props(&[(PASSWORD_PROPERTY, "hunter2")]));
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<password given>"));
    }
}

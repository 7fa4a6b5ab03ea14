//! Service Factory
//!
//! Materialises one cache service per build session from a
//! [`RedisCacheConfig`] and describes it for the host's logs.

use crate::cache::pool::{ConnectionPool, RedisPool};
use crate::cache::{BoxedBuildCacheService, RedisBuildCacheService};
use crate::config::RedisCacheConfig;
use crate::error::Result;
use std::fmt;
use tracing::info;

/// Cache type under which the Redis service is registered
pub const CACHE_TYPE: &str = "redis";

const WITHOUT_PASSWORD: &str = "<without password>";
const PASSWORD_GIVEN: &str = "<password given>";

// =============================================================================
// Describer
// =============================================================================

/// Sink for the human-readable description of a created service
pub trait Describer {
    fn cache_type(&mut self, cache_type: &str);

    fn config(&mut self, name: &str, value: &str);
}

/// Collects a description in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescription {
    pub cache_type: Option<String>,
    pub entries: Vec<(String, String)>,
}

impl ServiceDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl Describer for ServiceDescription {
    fn cache_type(&mut self, cache_type: &str) {
        self.cache_type = Some(cache_type.to_string());
    }

    fn config(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }
}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some(cache_type) = &self.cache_type {
            write!(f, "type={}", cache_type)?;
            first = false;
        }
        for (name, value) in &self.entries {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Write the description of a service built from `config`
pub fn describe(config: &RedisCacheConfig, describer: &mut dyn Describer) {
    describer.cache_type(CACHE_TYPE);
    describer.config("host", &config.host);
    describer.config("port", &config.port.to_string());
    describer.config(
        "password",
        if config.password.is_some() {
            PASSWORD_GIVEN
        } else {
            WITHOUT_PASSWORD
        },
    );
    describer.config("ttl", &config.time_to_live.to_string());
}

// =============================================================================
// Factory
// =============================================================================

/// Capability the host uses to obtain a service for a configuration
pub trait BuildCacheServiceFactory<C>: Send + Sync {
    fn create_build_cache_service(
        &self,
        config: &C,
        describer: &mut dyn Describer,
    ) -> Result<BoxedBuildCacheService>;
}

/// Builds [`RedisBuildCacheService`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisBuildCacheServiceFactory;

impl RedisBuildCacheServiceFactory {
    pub fn new() -> Self {
        Self
    }

    /// Validate, describe and build a service with its own pool
    pub fn create_service(
        &self,
        config: &RedisCacheConfig,
        describer: &mut dyn Describer,
    ) -> Result<RedisBuildCacheService> {
        let pool = self.prepare(config, describer, |config| {
            RedisPool::new(&config.host, config.port, config.password.as_deref())
        })?;
        Ok(RedisBuildCacheService::new(pool, config.time_to_live))
    }

    /// Same as [`create_service`](Self::create_service) over a caller-supplied pool
    pub fn create_service_with_pool<P: ConnectionPool>(
        &self,
        config: &RedisCacheConfig,
        describer: &mut dyn Describer,
        pool: P,
    ) -> Result<RedisBuildCacheService<P>> {
        let pool = self.prepare(config, describer, |_| Ok(pool))?;
        Ok(RedisBuildCacheService::new(pool, config.time_to_live))
    }

    fn prepare<P>(
        &self,
        config: &RedisCacheConfig,
        describer: &mut dyn Describer,
        build_pool: impl FnOnce(&RedisCacheConfig) -> Result<P>,
    ) -> Result<P> {
        config.validate()?;

        let mut description = ServiceDescription::new();
        describe(config, &mut description);
        describe(config, describer);

        let pool = build_pool(config)?;
        info!(description = %description, "Created Redis build cache service");
        Ok(pool)
    }
}

impl BuildCacheServiceFactory<RedisCacheConfig> for RedisBuildCacheServiceFactory {
    fn create_build_cache_service(
        &self,
        config: &RedisCacheConfig,
        describer: &mut dyn Describer,
    ) -> Result<BoxedBuildCacheService> {
        Ok(Box::new(self.create_service(config, describer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BuildCacheService, MemoryPool, MemoryStore};
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn config(password: Option<&str>) -> RedisCacheConfig {
        RedisCacheConfig {
            password: password.map(str::to_string),
            ..RedisCacheConfig::from_properties(&HashMap::new())
        }
    }

    #[test]
    fn test_description_without_password() {
        let mut description = ServiceDescription::new();
        describe(&config(None), &mut description);

        assert_eq!(
            description.to_string(),
            "type=redis, host=localhost, port=6379, password=<without password>, ttl=14400"
        );
        assert_eq!(description.cache_type.as_deref(), Some("redis"));
        assert_eq!(description.get("ttl"), Some("14400"));
    }

    #[test]
    fn test_description_never_contains_password() {
        let factory = RedisBuildCacheServiceFactory::new();
        let mut description = ServiceDescription::new();
        let service = factory
            .create_service(&config(Some("hunter2")), &mut description)
            .unwrap();

        assert_eq!(description.get("password"), Some("<password given>"));
        assert!(!description.to_string().contains("hunter2"));
        assert!(!format!("{:?}", description).contains("hunter2"));
        assert!(!format!("{:?}", service).contains("hunter2"));
        assert!(!service.pool().endpoint().contains("hunter2"));
    }

    #[test]
    fn test_ttl_converted_once() {
        let factory = RedisBuildCacheServiceFactory::new();
        let mut cfg = config(None);
        cfg.time_to_live = 2;

        let service = factory
            .create_service_with_pool(&cfg, &mut ServiceDescription::new(), MemoryPool::default())
            .unwrap();
        assert_eq!(service.ttl_seconds(), 120);
    }

    #[test]
    fn test_invalid_config_rejected_before_describing() {
        let factory = RedisBuildCacheServiceFactory::new();
        let mut cfg = config(None);
        cfg.time_to_live = 0;

        let mut description = ServiceDescription::new();
        let result = factory.create_build_cache_service(&cfg, &mut description);
        assert_matches!(result, Err(Error::Configuration(_)));
        assert!(description.entries.is_empty());
    }

    #[test]
    fn test_created_service_is_usable() {
        let store = MemoryStore::new();
        let factory = RedisBuildCacheServiceFactory::new();
        let service = factory
            .create_service_with_pool(
                &config(None),
                &mut ServiceDescription::new(),
                MemoryPool::new(store.clone()),
            )
            .unwrap();

        service.store(&"abc", &mut &b"body"[..]).unwrap();
        assert_eq!(store.text("abc").as_deref(), Some("Ym9keQ=="));
        service.close().unwrap();
    }

    #[test]
    fn test_boxed_service_construction_does_not_connect() {
        let factory = RedisBuildCacheServiceFactory::new();
        let mut cfg = config(None);
        cfg.host = "redis.invalid".into();

        let service = factory
            .create_build_cache_service(&cfg, &mut ServiceDescription::new())
            .unwrap();
        service.close().unwrap();
    }
}

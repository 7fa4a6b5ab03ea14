//! Host Binding
//!
//! Hooks the Redis service type into the host's build cache settings. The
//! plugin only registers the factory and turns on push; everything else is
//! decided by the configuration.

use crate::cache::BoxedBuildCacheService;
use crate::config::RedisCacheConfig;
use crate::error::{Error, Result};
use crate::factory::{
    BuildCacheServiceFactory, Describer, RedisBuildCacheServiceFactory, CACHE_TYPE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Remote Cache Settings
// =============================================================================

/// Host-side settings of the remote cache
#[derive(Debug, Clone)]
pub struct RemoteBuildCache<C> {
    /// Registered cache type; None until a type is selected
    pub cache_type: Option<String>,
    pub config: C,
    pub push: bool,
    pub enabled: bool,
}

impl<C> RemoteBuildCache<C> {
    pub fn new(config: C) -> Self {
        Self {
            cache_type: None,
            config,
            push: false,
            enabled: true,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// The host's cache-configuration subsystem
pub trait BuildCacheRegistry<C> {
    fn register_build_cache_service(
        &mut self,
        cache_type: &str,
        factory: Arc<dyn BuildCacheServiceFactory<C>>,
    );

    /// Select `cache_type` as the remote cache and return its settings
    fn remote(&mut self, cache_type: &str) -> &mut RemoteBuildCache<C>;
}

/// In-process implementation of [`BuildCacheRegistry`]
pub struct BuildCacheSettings<C> {
    factories: HashMap<String, Arc<dyn BuildCacheServiceFactory<C>>>,
    remote: RemoteBuildCache<C>,
}

impl<C> BuildCacheSettings<C> {
    pub fn new(config: C) -> Self {
        Self {
            factories: HashMap::new(),
            remote: RemoteBuildCache::new(config),
        }
    }

    pub fn remote_settings(&self) -> &RemoteBuildCache<C> {
        &self.remote
    }

    pub fn is_registered(&self, cache_type: &str) -> bool {
        self.factories.contains_key(cache_type)
    }

    /// Create the remote service, or None when the remote cache is disabled
    pub fn create_remote_service(
        &self,
        describer: &mut dyn Describer,
    ) -> Result<Option<BoxedBuildCacheService>> {
        if !self.remote.enabled {
            debug!("Remote build cache disabled");
            return Ok(None);
        }

        let cache_type = self
            .remote
            .cache_type
            .as_deref()
            .ok_or_else(|| Error::Configuration("no remote build cache selected".into()))?;
        let factory = self.factories.get(cache_type).ok_or_else(|| {
            Error::Configuration(format!("unknown build cache type: {}", cache_type))
        })?;

        factory
            .create_build_cache_service(&self.remote.config, describer)
            .map(Some)
    }
}

impl<C> BuildCacheRegistry<C> for BuildCacheSettings<C> {
    fn register_build_cache_service(
        &mut self,
        cache_type: &str,
        factory: Arc<dyn BuildCacheServiceFactory<C>>,
    ) {
        debug!(cache_type, "Registered build cache service");
        self.factories.insert(cache_type.to_string(), factory);
    }

    fn remote(&mut self, cache_type: &str) -> &mut RemoteBuildCache<C> {
        self.remote.cache_type = Some(cache_type.to_string());
        &mut self.remote
    }
}

// =============================================================================
// Plugin
// =============================================================================

/// Registers the Redis cache with the host
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisBuildCachePlugin;

impl RedisBuildCachePlugin {
    pub fn apply(&self, registry: &mut impl BuildCacheRegistry<RedisCacheConfig>) {
        registry.register_build_cache_service(
            CACHE_TYPE,
            Arc::new(RedisBuildCacheServiceFactory::new()),
        );
        registry.remote(CACHE_TYPE).push = true;
        info!(cache_type = CACHE_TYPE, "Redis build cache plugin applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ServiceDescription;
    use assert_matches::assert_matches;

    fn settings() -> BuildCacheSettings<RedisCacheConfig> {
        BuildCacheSettings::new(RedisCacheConfig::from_properties(&HashMap::new()))
    }

    #[test]
    fn test_apply_registers_and_enables_push() {
        let mut settings = settings();
        RedisBuildCachePlugin.apply(&mut settings);

        assert!(settings.is_registered("redis"));
        let remote = settings.remote_settings();
        assert_eq!(remote.cache_type.as_deref(), Some("redis"));
        assert!(remote.push);
        assert!(remote.enabled);
    }

    #[test]
    fn test_create_remote_service() {
        let mut settings = settings();
        RedisBuildCachePlugin.apply(&mut settings);

        let mut description = ServiceDescription::new();
        let service = settings.create_remote_service(&mut description).unwrap();
        assert!(service.is_some());
        assert_eq!(description.cache_type.as_deref(), Some("redis"));
    }

    #[test]
    fn test_disabled_remote_creates_nothing() {
        let mut settings = settings();
        RedisBuildCachePlugin.apply(&mut settings);
        settings.remote("redis").enabled = false;

        let mut description = ServiceDescription::new();
        let service = settings.create_remote_service(&mut description).unwrap();
        assert!(service.is_none());
        assert!(description.entries.is_empty());
    }

    #[test]
    fn test_unregistered_type_is_a_configuration_error() {
        let mut settings = settings();
        settings.remote("memcached");

        let result = settings.create_remote_service(&mut ServiceDescription::new());
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[test]
    fn test_no_selection_is_a_configuration_error() {
        let settings = settings();
        let result = settings.create_remote_service(&mut ServiceDescription::new());
        assert_matches!(result, Err(Error::Configuration(_)));
    }
}

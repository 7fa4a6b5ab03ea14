//! Redis Build Cache - Remote Artifact Cache
//!
//! A remote build cache backed by Redis. The host build tool stores artifacts
//! under a content-addressed fingerprint and later builds fetch them instead
//! of recomputing. Access statistics are kept per key and per day in the
//! same store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Host Build Tool                                 │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │     Plugin      │  │    Factory      │  │      Configuration          │  │
//! │  │  (registration) │──│  (describe +    │──│  (properties, YAML)         │  │
//! │  │                 │  │   create)       │  │                             │  │
//! │  └─────────────────┘  └────────┬────────┘  └─────────────────────────────┘  │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │ RedisBuildCacheService│                                │
//! │                    │  load / store / close │                                │
//! │                    └───────────┬───────────┘                                │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │          Entry Codec ── Statistics Recorder ── Connection Pool               │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                              Redis                                           │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Cache service, codec, pool, and statistics
//! - [`config`]: Settings and property overrides
//! - [`factory`]: Service creation and description
//! - [`plugin`]: Registration with the host
//! - [`error`]: Error types and handling

pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod plugin;

// Re-export commonly used types
pub use cache::{
    BoxedBuildCacheService, BuildCacheKey, BuildCacheService, CacheKey, ConnectionPool,
    CopyFrom, CopyInto, DailyStatistics, EntryReader, EntryWriter, KeyStatistics, LoadOutcome,
    RedisBuildCacheService, RedisPool,
};

pub use config::{PropertySource, RedisCacheConfig, SystemProperties};

pub use error::{Error, ErrorAction, Result};

pub use factory::{
    BuildCacheServiceFactory, Describer, RedisBuildCacheServiceFactory, ServiceDescription,
};

pub use plugin::{BuildCacheRegistry, BuildCacheSettings, RedisBuildCachePlugin, RemoteBuildCache};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

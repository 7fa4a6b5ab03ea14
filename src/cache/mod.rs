//! Remote Build Cache
//!
//! Artifacts produced by the host build tool are stored in Redis under their
//! fingerprint, base64-encoded, with a sliding expiration that is renewed on
//! every access. Hit/miss statistics live next to the artifacts in the same
//! store and share their lifetime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       RedisBuildCacheService                             │
//! │                 load(key, reader) / store(key, writer)                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────────────┐   │
//! │  │ Entry Codec  │  │ Statistics       │  │ Session Metrics          │   │
//! │  │ (base64)     │  │ Recorder         │  │ (process-local)          │   │
//! │  └──────────────┘  └────────┬─────────┘  └──────────────────────────┘   │
//! │                             │                                            │
//! │                 ┌───────────┴────────────┐                               │
//! │                 │  ConnectionPool        │                               │
//! │                 │  with_connection(op)   │                               │
//! │                 └───────────┬────────────┘                               │
//! ├─────────────────────────────┼───────────────────────────────────────────┤
//! │          <hash>   statistic_YYYY-MM-DD   key_statistic_<hash>            │
//! │                          Redis                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use redis_build_cache::cache::{BuildCacheService, CacheKey, RedisBuildCacheService};
//! use bytes::Bytes;
//!
//! let service = RedisBuildCacheService::connect("localhost", 6379, None, 14400)?;
//! let key = CacheKey::new("4f1c9a0e");
//!
//! service.store(&key, &mut Bytes::from_static(b"compiled output"))?;
//!
//! let mut body = Vec::new();
//! if service.load(&key, &mut body)?.is_found() {
//!     println!("restored {} bytes", body.len());
//! }
//! service.close()?;
//! ```

pub mod codec;
pub mod commands;
pub mod entry;
pub mod memory;
pub mod metrics;
pub mod pool;
pub mod service;
pub mod statistics;

// Re-export main types
pub use commands::StoreCommands;
pub use entry::{BuildCacheKey, CacheKey, CopyFrom, CopyInto, EntryReader, EntryWriter};
pub use memory::{MemoryPool, MemoryStore};
pub use metrics::{SessionMetrics, SessionSnapshot};
pub use pool::{ConnectionPool, PoolSettings, RedisPool};
pub use service::RedisBuildCacheService;
pub use statistics::{
    Clock, Counters, DailyStatistics, KeyStatistics, StatisticsReader, StatisticsRecorder,
    SystemClock,
};

use crate::error::Result;

// =============================================================================
// Load Outcome
// =============================================================================

/// Result of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The entry existed and was handed to the reader
    Found,
    /// No entry under the key; the reader was not called
    NotFound,
}

impl LoadOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LoadOutcome::Found)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadOutcome::NotFound)
    }
}

impl From<LoadOutcome> for bool {
    fn from(outcome: LoadOutcome) -> Self {
        outcome.is_found()
    }
}

// =============================================================================
// BuildCacheService Trait (Port)
// =============================================================================

/// Capability set the host build tool drives
///
/// Implementations are shared across the host's worker threads; each call
/// is independent and completes synchronously.
pub trait BuildCacheService: std::fmt::Debug + Send + Sync {
    /// Look up `key` and feed the stored body to `reader`
    ///
    /// A transport failure is always an error, never [`LoadOutcome::NotFound`].
    fn load(&self, key: &dyn BuildCacheKey, reader: &mut dyn EntryReader) -> Result<LoadOutcome>;

    /// Drain `writer` and store the body under `key`
    fn store(&self, key: &dyn BuildCacheKey, writer: &mut dyn EntryWriter) -> Result<()>;

    /// Release the service's resources. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}

/// Type alias for a boxed service as handed to the host
pub type BoxedBuildCacheService = Box<dyn BuildCacheService>;

// =============================================================================
// Tests
// =============================================================================

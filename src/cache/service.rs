//! Redis Build Cache Service
//!
//! Implements [`BuildCacheService`] on top of a [`ConnectionPool`]. Each
//! call borrows one connection and issues its commands sequentially on it:
//!
//! - hit: `GET`, `EXPIRE <hash>`, daily and per-key counters
//! - miss: daily and per-key counters, per-key `begin`
//! - store: `SET .. EX`, per-key `size`, `end`, `duration`

use crate::cache::codec;
use crate::cache::commands::StoreCommands;
use crate::cache::entry::{BuildCacheKey, EntryReader, EntryWriter};
use crate::cache::metrics::{SessionMetrics, SessionSnapshot};
use crate::cache::pool::{ConnectionPool, RedisPool};
use crate::cache::statistics::{
    Clock, DailyStatistics, KeyStatistics, StatisticsReader, StatisticsRecorder, SystemClock,
};
use crate::cache::{BuildCacheService, LoadOutcome};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDate;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Build cache service storing artifacts in Redis
pub struct RedisBuildCacheService<P = RedisPool, C = SystemClock> {
    pool: P,
    ttl_seconds: u64,
    statistics: StatisticsRecorder<C>,
    metrics: SessionMetrics,
    summarised: AtomicBool,
}

impl RedisBuildCacheService<RedisPool, SystemClock> {
    /// Create a service with its own pool for `host:port`
    pub fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
        ttl_minutes: u32,
    ) -> Result<Self> {
        let pool = RedisPool::new(host, port, password)?;
        Ok(Self::new(pool, ttl_minutes))
    }
}

impl<P: ConnectionPool> RedisBuildCacheService<P, SystemClock> {
    /// Create a service over an existing pool
    pub fn new(pool: P, ttl_minutes: u32) -> Self {
        Self::with_clock(pool, ttl_minutes, SystemClock)
    }
}

impl<P: ConnectionPool, C: Clock> RedisBuildCacheService<P, C> {
    /// Create a service with an explicit time source
    pub fn with_clock(pool: P, ttl_minutes: u32, clock: C) -> Self {
        let ttl_seconds = u64::from(ttl_minutes) * 60;
        Self {
            pool,
            ttl_seconds,
            statistics: StatisticsRecorder::with_clock(ttl_seconds, clock),
            metrics: SessionMetrics::new(),
            summarised: AtomicBool::new(false),
        }
    }

    /// Expiration applied on every write and hit
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Process-local counters for this session
    pub fn metrics(&self) -> SessionSnapshot {
        self.metrics.snapshot()
    }

    /// Check that the store answers `PING`
    pub fn ping(&self) -> Result<bool> {
        self.pool
            .with_connection(|conn| Ok(conn.ping()? == "PONG"))
    }

    /// Read the daily statistics for `date`
    pub fn daily_statistics(&self, date: NaiveDate) -> Result<DailyStatistics> {
        self.pool
            .with_connection(|conn| Ok(StatisticsReader::daily(conn, date)?))
    }

    /// Read the statistics kept for `hash`
    pub fn key_statistics(&self, hash: &str) -> Result<Option<KeyStatistics>> {
        self.pool
            .with_connection(|conn| Ok(StatisticsReader::key(conn, hash)?))
    }

    /// Returns the raw length on a hit, None on a miss
    fn load_entry(&self, hash: &str, reader: &mut dyn EntryReader) -> Result<Option<usize>> {
        self.pool.with_connection(|conn| {
            let Some(stored) = conn.get(hash)? else {
                self.statistics.record_miss(conn, hash)?;
                return Ok(None);
            };

            let raw = codec::decode(&stored).map_err(|e| Error::materialize(hash, e))?;
            let mut input: &[u8] = &raw;
            reader
                .read_from(&mut input)
                .map_err(|e| Error::materialize(hash, e))?;

            conn.expire(hash, self.ttl_seconds)?;
            self.statistics.record_hit(conn, hash)?;
            Ok(Some(raw.len()))
        })
    }
}

/// Drain the host's writer into an in-memory buffer
fn drain(writer: &mut dyn EntryWriter) -> io::Result<Bytes> {
    let mut buffer = BytesMut::new().writer();
    writer.write_to(&mut buffer)?;
    buffer.flush()?;
    Ok(buffer.into_inner().freeze())
}

impl<P: ConnectionPool, C: Clock> BuildCacheService for RedisBuildCacheService<P, C> {
    fn load(&self, key: &dyn BuildCacheKey, reader: &mut dyn EntryReader) -> Result<LoadOutcome> {
        let hash = key.hash_code();

        match self.load_entry(hash, reader) {
            Ok(Some(raw_len)) => {
                self.metrics.record_hit(raw_len);
                debug!(key = key.display_name(), bytes = raw_len, "Cache hit");
                Ok(LoadOutcome::Found)
            }
            Ok(None) => {
                self.metrics.record_miss();
                debug!(key = key.display_name(), "Cache miss");
                Ok(LoadOutcome::NotFound)
            }
            Err(e) => {
                self.metrics.record_failure();
                debug!(key = key.display_name(), error = %e, "Cache load failed");
                Err(e)
            }
        }
    }

    fn store(&self, key: &dyn BuildCacheKey, writer: &mut dyn EntryWriter) -> Result<()> {
        let hash = key.hash_code();

        let encoded = match drain(writer) {
            Ok(body) => codec::encode(&body),
            Err(e) => {
                self.metrics.record_failure();
                return Err(Error::ReadValue(e));
            }
        };

        let stored = self.pool.with_connection(|conn| {
            conn.set_ex(hash, &encoded, self.ttl_seconds)?;
            Ok(self.statistics.record_store(conn, hash, encoded.len())?)
        });

        match stored {
            Ok(timing) => {
                self.metrics.record_store(encoded.len());
                debug!(
                    key = key.display_name(),
                    encoded_bytes = encoded.len(),
                    duration_ms = ?timing.duration,
                    "Cache store"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                debug!(key = key.display_name(), error = %e, "Cache store failed");
                Err(e)
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.pool.close()?;

        if !self.summarised.swap(true, Ordering::SeqCst) {
            let snapshot = self.metrics.snapshot();
            info!(
                hits = snapshot.hits,
                misses = snapshot.misses,
                stores = snapshot.stores,
                bytes_loaded = snapshot.bytes_loaded,
                bytes_stored = snapshot.bytes_stored,
                failures = snapshot.failures,
                hit_ratio = snapshot.hit_ratio(),
                "Redis build cache closed"
            );
        }
        Ok(())
    }
}

impl<P, C> std::fmt::Debug for RedisBuildCacheService<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBuildCacheService")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================


#[cfg(all(test, feature = "redis-integration"))]
mod integration {
    use super::*;
    use crate::cache::entry::CacheKey;
    use crate::cache::statistics::{daily_statistic_key, key_statistic_key};
    use crate::config::RedisCacheConfig;

    /// Service against the server named by `BUILD_CACHE_REDIS_*`, None when unreachable
    fn live_service() -> Option<RedisBuildCacheService> {
        let config = RedisCacheConfig::default();
        let service =
            RedisBuildCacheService::connect(&config.host, config.port, config.password.as_deref(), 1)
                .ok()?;
        match service.ping() {
            Ok(true) => Some(service),
            _ => {
                eprintln!("skipping: no Redis at {}:{}", config.host, config.port);
                None
            }
        }
    }

    #[test]
    fn test_live_round_trip() {
        let Some(service) = live_service() else {
            return;
        };
        let key = CacheKey::new(format!("it-{}", std::process::id()));

        assert!(service.load(&key, &mut Vec::<u8>::new()).unwrap().is_not_found());
        service.store(&key, &mut &b"live artifact"[..]).unwrap();

        let mut sink: Vec<u8> = Vec::new();
        assert!(service.load(&key, &mut sink).unwrap().is_found());
        assert_eq!(sink, b"live artifact");

        let stats = service.key_statistics(key.as_str()).unwrap().unwrap();
        assert_eq!(stats.counters.hits, 1);
        assert_eq!(stats.counters.misses, 1);

        service
            .pool()
            .with_connection(|conn| {
                assert!(conn.expire(key.as_str(), 1)?);
                assert!(conn.expire(&key_statistic_key(key.as_str()), 1)?);
                Ok(())
            })
            .unwrap();
        assert!(daily_statistic_key(chrono::Local::now().date_naive()).starts_with("statistic_"));
        service.close().unwrap();
    }
}

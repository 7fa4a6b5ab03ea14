//! Access Statistics
//!
//! Hit/miss counters kept in the same store as the artifacts, under
//! `statistic_YYYY-MM-DD` (one hash per local day) and
//! `key_statistic_<hash>` (one hash per cache key). Both records receive the
//! artifact TTL on every update so they expire together with the entry.

use crate::cache::commands::StoreCommands;
use chrono::{DateTime, Local, NaiveDate};
use redis::RedisResult;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Field and Key Names
// =============================================================================

pub const HITS: &str = "hits";
pub const MISSES: &str = "misses";
pub const BEGIN: &str = "begin";
pub const END: &str = "end";
pub const SIZE: &str = "size";
pub const DURATION: &str = "duration";

const DAILY_PREFIX: &str = "statistic_";
const KEY_PREFIX: &str = "key_statistic_";

/// Key of the daily record for `date`
pub fn daily_statistic_key(date: NaiveDate) -> String {
    format!("{}{}", DAILY_PREFIX, date.format("%Y-%m-%d"))
}

/// Key of the per-key record for `hash`
pub fn key_statistic_key(hash: &str) -> String {
    format!("{}{}", KEY_PREFIX, hash)
}

/// Field in the daily record counting `counter` ("hits"/"misses") for `hash`
pub fn daily_key_field(hash: &str, counter: &str) -> String {
    format!("key_{}_{}", hash, counter)
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

// =============================================================================
// Statistics Recorder
// =============================================================================

/// Timestamps written by [`StatisticsRecorder::record_store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTiming {
    /// Epoch millis of the store
    pub end: i64,
    /// `end - begin` when a parseable `begin` was present
    pub duration: Option<i64>,
}

/// Writes hit, miss, and store statistics
#[derive(Debug, Clone)]
pub struct StatisticsRecorder<C = SystemClock> {
    ttl_seconds: u64,
    clock: C,
}

impl StatisticsRecorder<SystemClock> {
    pub fn new(ttl_seconds: u64) -> Self {
        Self::with_clock(ttl_seconds, SystemClock)
    }
}

impl<C: Clock> StatisticsRecorder<C> {
    pub fn with_clock(ttl_seconds: u64, clock: C) -> Self {
        Self { ttl_seconds, clock }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Count a hit for `hash` in the daily and per-key records
    pub fn record_hit(&self, conn: &mut impl StoreCommands, hash: &str) -> RedisResult<()> {
        self.bump_daily(conn, hash, HITS)?;

        let key_stats = key_statistic_key(hash);
        conn.hincr_by(&key_stats, HITS, 1)?;
        conn.expire(&key_stats, self.ttl_seconds)?;
        Ok(())
    }

    /// Count a miss for `hash` and stamp `begin` with the current time
    pub fn record_miss(&self, conn: &mut impl StoreCommands, hash: &str) -> RedisResult<()> {
        self.bump_daily(conn, hash, MISSES)?;

        let key_stats = key_statistic_key(hash);
        conn.hincr_by(&key_stats, MISSES, 1)?;
        conn.hset(&key_stats, BEGIN, &self.now_millis().to_string())?;
        conn.expire(&key_stats, self.ttl_seconds)?;
        Ok(())
    }

    /// Record size and completion time of a store for `hash`
    ///
    /// `duration` is only written when a miss left a `begin` that parses as
    /// an integer; it is never clamped. `begin` is not cleared here, so a
    /// repeated store without a new miss in between measures from the last
    /// miss and `duration` spans every store since then.
    pub fn record_store(
        &self,
        conn: &mut impl StoreCommands,
        hash: &str,
        encoded_size: usize,
    ) -> RedisResult<StoreTiming> {
        let key_stats = key_statistic_key(hash);
        conn.hset(&key_stats, SIZE, &encoded_size.to_string())?;

        let end = self.now_millis();
        conn.hset(&key_stats, END, &end.to_string())?;

        let begin = conn
            .hget(&key_stats, BEGIN)?
            .and_then(|raw| raw.trim().parse::<i64>().ok());
        let duration = begin.map(|begin| end - begin);
        if let Some(duration) = duration {
            conn.hset(&key_stats, DURATION, &duration.to_string())?;
        }

        conn.expire(&key_stats, self.ttl_seconds)?;
        Ok(StoreTiming { end, duration })
    }

    fn bump_daily(&self, conn: &mut impl StoreCommands, hash: &str, counter: &str) -> RedisResult<()> {
        let daily = daily_statistic_key(self.clock.now().date_naive());
        conn.hincr_by(&daily, counter, 1)?;
        conn.hincr_by(&daily, &daily_key_field(hash, counter), 1)?;
        conn.expire(&daily, self.ttl_seconds)?;
        Ok(())
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

// =============================================================================
// Statistics Records
// =============================================================================

/// Hit/miss pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
}

impl Counters {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Contents of `statistic_YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: Counters,
    /// Per-key breakdown, keyed by cache key hash
    pub keys: BTreeMap<String, Counters>,
}

impl DailyStatistics {
    fn from_fields(date: NaiveDate, fields: &HashMap<String, String>) -> Self {
        let mut totals = Counters::default();
        let mut keys: BTreeMap<String, Counters> = BTreeMap::new();

        for (field, raw) in fields {
            let value = raw.parse::<u64>().unwrap_or(0);
            match field.as_str() {
                HITS => totals.hits = value,
                MISSES => totals.misses = value,
                other => {
                    let Some(rest) = other.strip_prefix("key_") else {
                        continue;
                    };
                    if let Some(hash) = rest.strip_suffix("_hits") {
                        keys.entry(hash.to_string()).or_default().hits = value;
                    } else if let Some(hash) = rest.strip_suffix("_misses") {
                        keys.entry(hash.to_string()).or_default().misses = value;
                    }
                }
            }
        }

        Self { date, totals, keys }
    }
}

/// Contents of `key_statistic_<hash>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatistics {
    pub hash: String,
    #[serde(flatten)]
    pub counters: Counters,
    pub begin: Option<i64>,
    pub end: Option<i64>,
    pub size: Option<u64>,
    pub duration: Option<i64>,
}

impl KeyStatistics {
    fn from_fields(hash: &str, fields: &HashMap<String, String>) -> Self {
        let int = |name: &str| fields.get(name).and_then(|raw| raw.parse::<i64>().ok());
        Self {
            hash: hash.to_string(),
            counters: Counters {
                hits: int(HITS).map_or(0, |v| v.max(0) as u64),
                misses: int(MISSES).map_or(0, |v| v.max(0) as u64),
            },
            begin: int(BEGIN),
            end: int(END),
            size: int(SIZE).map(|v| v.max(0) as u64),
            duration: int(DURATION),
        }
    }
}

// =============================================================================
// Statistics Reader
// =============================================================================

/// Read-only access to the statistic records; never touches expirations
pub struct StatisticsReader;

impl StatisticsReader {
    /// Daily record for `date`, empty if none exists
    pub fn daily(conn: &mut impl StoreCommands, date: NaiveDate) -> RedisResult<DailyStatistics> {
        let fields = conn.hgetall(&daily_statistic_key(date))?;
        Ok(DailyStatistics::from_fields(date, &fields))
    }

    /// Per-key record for `hash`, or None if the key has no statistics
    pub fn key(conn: &mut impl StoreCommands, hash: &str) -> RedisResult<Option<KeyStatistics>> {
        let fields = conn.hgetall(&key_statistic_key(hash))?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(KeyStatistics::from_fields(hash, &fields)))
    }
}

// =============================================================================
// Tests
// =============================================================================

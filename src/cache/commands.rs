//! Store Command Surface
//!
//! The complete set of Redis commands the cache issues. Keeping the surface
//! this narrow lets the service run against a pooled `redis::Connection` or
//! the in-process [`MemoryStore`](crate::cache::memory::MemoryStore).

use r2d2::PooledConnection;
use redis::RedisResult;
use std::collections::HashMap;

// =============================================================================
// StoreCommands Trait
// =============================================================================

/// Commands issued against the backing store
pub trait StoreCommands {
    /// `GET key`
    fn get(&mut self, key: &str) -> RedisResult<Option<Vec<u8>>>;

    /// `SET key value EX seconds`
    fn set_ex(&mut self, key: &str, value: &str, seconds: u64) -> RedisResult<()>;

    /// `EXPIRE key seconds`, true if the key existed
    fn expire(&mut self, key: &str, seconds: u64) -> RedisResult<bool>;

    /// `HINCRBY key field delta`, returns the new value
    fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> RedisResult<i64>;

    /// `HSET key field value`
    fn hset(&mut self, key: &str, field: &str, value: &str) -> RedisResult<()>;

    /// `HGET key field`
    fn hget(&mut self, key: &str, field: &str) -> RedisResult<Option<String>>;

    /// `HGETALL key`
    fn hgetall(&mut self, key: &str) -> RedisResult<HashMap<String, String>>;

    /// `PING`
    fn ping(&mut self) -> RedisResult<String>;
}

// =============================================================================
// Redis Connection
// =============================================================================

impl StoreCommands for redis::Connection {
    fn get(&mut self, key: &str) -> RedisResult<Option<Vec<u8>>> {
        redis::cmd("GET").arg(key).query(self)
    }

    fn set_ex(&mut self, key: &str, value: &str, seconds: u64) -> RedisResult<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query(self)
    }

    fn expire(&mut self, key: &str, seconds: u64) -> RedisResult<bool> {
        let updated: i64 = redis::cmd("EXPIRE").arg(key).arg(seconds).query(self)?;
        Ok(updated == 1)
    }

    fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> RedisResult<i64> {
        redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query(self)
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) -> RedisResult<()> {
        redis::cmd("HSET").arg(key).arg(field).arg(value).query(self)
    }

    fn hget(&mut self, key: &str, field: &str) -> RedisResult<Option<String>> {
        redis::cmd("HGET").arg(key).arg(field).query(self)
    }

    fn hgetall(&mut self, key: &str) -> RedisResult<HashMap<String, String>> {
        redis::cmd("HGETALL").arg(key).query(self)
    }

    fn ping(&mut self) -> RedisResult<String> {
        redis::cmd("PING").query(self)
    }
}

/// Pooled connections forward to the underlying connection
impl StoreCommands for PooledConnection<redis::Client> {
    fn get(&mut self, key: &str) -> RedisResult<Option<Vec<u8>>> {
        StoreCommands::get(&mut **self, key)
    }

    fn set_ex(&mut self, key: &str, value: &str, seconds: u64) -> RedisResult<()> {
        StoreCommands::set_ex(&mut **self, key, value, seconds)
    }

    fn expire(&mut self, key: &str, seconds: u64) -> RedisResult<bool> {
        StoreCommands::expire(&mut **self, key, seconds)
    }

    fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> RedisResult<i64> {
        StoreCommands::hincr_by(&mut **self, key, field, delta)
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) -> RedisResult<()> {
        StoreCommands::hset(&mut **self, key, field, value)
    }

    fn hget(&mut self, key: &str, field: &str) -> RedisResult<Option<String>> {
        StoreCommands::hget(&mut **self, key, field)
    }

    fn hgetall(&mut self, key: &str) -> RedisResult<HashMap<String, String>> {
        StoreCommands::hgetall(&mut **self, key)
    }

    fn ping(&mut self) -> RedisResult<String> {
        StoreCommands::ping(&mut **self)
    }
}

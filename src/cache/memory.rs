//! In-Process Store
//!
//! A stand-in for the Redis server that understands the cache's command
//! surface. It records every command it receives, remembers the expiration
//! last applied to each key, and can be told to fail specific commands, so
//! hosts and tests can exercise the service without a server.

use crate::cache::commands::StoreCommands;
use crate::cache::pool::ConnectionPool;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use redis::{ErrorKind, RedisError, RedisResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Stored Values
// =============================================================================

#[derive(Debug, Clone)]
enum StoredValue {
    Text(Vec<u8>),
    Hash(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
struct StoredKey {
    value: StoredValue,
    /// Expiration in seconds as last set; None = persistent
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Default)]
struct StoreState {
    keys: HashMap<String, StoredKey>,
    log: Vec<String>,
    failing_commands: HashSet<String>,
    /// Absolute command index (into the log) that must fail
    fail_at: Option<usize>,
}

fn wrong_type() -> RedisError {
    RedisError::from((
        ErrorKind::TypeError,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    ))
}

// =============================================================================
// Memory Store
// =============================================================================

/// Shared in-memory key space; clones refer to the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every future invocation of `command` (e.g. `"HGET"`)
    pub fn fail_command(&self, command: &str) {
        self.state
            .lock()
            .failing_commands
            .insert(command.to_ascii_uppercase());
    }

    /// Fail only the `n`-th command issued from now on (0-based)
    pub fn fail_nth_command(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_at = Some(state.log.len() + n);
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_commands.clear();
        state.fail_at = None;
    }

    /// Commands received so far, one line each (`"SET abc AQID EX 60"`)
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Forget the recorded commands
    pub fn clear_commands(&self) {
        self.state.lock().log.clear();
    }

    /// Names of all keys currently present, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Text value stored at `key`
    pub fn text(&self, key: &str) -> Option<String> {
        match self.state.lock().keys.get(key).map(|k| &k.value) {
            Some(StoredValue::Text(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    /// Hash stored at `key`
    pub fn hash(&self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.state.lock().keys.get(key).map(|k| &k.value) {
            Some(StoredValue::Hash(fields)) => Some(fields.clone()),
            _ => None,
        }
    }

    /// Single hash field stored at `key`
    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        self.hash(key).and_then(|fields| fields.get(field).cloned())
    }

    /// Expiration last applied to `key`
    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.state.lock().keys.get(key).and_then(|k| k.ttl_seconds)
    }

    /// Plant a raw text value without going through the command log
    pub fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.state.lock().keys.insert(
            key.to_string(),
            StoredKey {
                value: StoredValue::Text(value.into()),
                ttl_seconds: None,
            },
        );
    }

    /// Plant a raw hash field without going through the command log
    pub fn insert_hash_field(&self, key: &str, field: &str, value: &str) {
        let mut state = self.state.lock();
        let entry = state.keys.entry(key.to_string()).or_insert_with(|| StoredKey {
            value: StoredValue::Hash(BTreeMap::new()),
            ttl_seconds: None,
        });
        if let StoredValue::Hash(fields) = &mut entry.value {
            fields.insert(field.to_string(), value.to_string());
        }
    }

    /// Drop `key` as if its expiration had elapsed
    pub fn expire_now(&self, key: &str) -> bool {
        self.state.lock().keys.remove(key).is_some()
    }

    /// Record a command and decide whether it fails
    fn issue(&self, state: &mut StoreState, line: String) -> RedisResult<()> {
        let index = state.log.len();
        let name = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        state.log.push(line);

        if state.fail_at == Some(index) || state.failing_commands.contains(&name) {
            return Err(RedisError::from(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("injected failure on {}", name),
            )));
        }
        Ok(())
    }

    fn with_hash<T>(
        state: &mut StoreState,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> RedisResult<T>,
    ) -> RedisResult<Option<T>> {
        if create && !state.keys.contains_key(key) {
            state.keys.insert(
                key.to_string(),
                StoredKey {
                    value: StoredValue::Hash(BTreeMap::new()),
                    ttl_seconds: None,
                },
            );
        }

        match state.keys.get_mut(key).map(|k| &mut k.value) {
            Some(StoredValue::Hash(fields)) => f(fields).map(Some),
            Some(StoredValue::Text(_)) => Err(wrong_type()),
            None => Ok(None),
        }
    }
}

impl StoreCommands for MemoryStore {
    fn get(&mut self, key: &str) -> RedisResult<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("GET {}", key))?;

        match state.keys.get(key).map(|k| &k.value) {
            Some(StoredValue::Text(bytes)) => Ok(Some(bytes.clone())),
            Some(StoredValue::Hash(_)) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    fn set_ex(&mut self, key: &str, value: &str, seconds: u64) -> RedisResult<()> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("SET {} {} EX {}", key, value, seconds))?;

        if seconds == 0 {
            return Err(RedisError::from((
                ErrorKind::ResponseError,
                "invalid expire time in 'set' command",
            )));
        }
        state.keys.insert(
            key.to_string(),
            StoredKey {
                value: StoredValue::Text(value.as_bytes().to_vec()),
                ttl_seconds: Some(seconds),
            },
        );
        Ok(())
    }

    fn expire(&mut self, key: &str, seconds: u64) -> RedisResult<bool> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("EXPIRE {} {}", key, seconds))?;

        match state.keys.get_mut(key) {
            Some(stored) => {
                stored.ttl_seconds = Some(seconds);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> RedisResult<i64> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("HINCRBY {} {} {}", key, field, delta))?;

        let updated = Self::with_hash(&mut state, key, true, |fields| {
            let current = match fields.get(field) {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    RedisError::from((ErrorKind::ResponseError, "hash value is not an integer"))
                })?,
                None => 0,
            };
            let next = current + delta;
            fields.insert(field.to_string(), next.to_string());
            Ok(next)
        })?;
        Ok(updated.unwrap_or(delta))
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) -> RedisResult<()> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("HSET {} {} {}", key, field, value))?;

        Self::with_hash(&mut state, key, true, |fields| {
            fields.insert(field.to_string(), value.to_string());
            Ok(())
        })?;
        Ok(())
    }

    fn hget(&mut self, key: &str, field: &str) -> RedisResult<Option<String>> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("HGET {} {}", key, field))?;

        let value = Self::with_hash(&mut state, key, false, |fields| Ok(fields.get(field).cloned()))?;
        Ok(value.flatten())
    }

    fn hgetall(&mut self, key: &str) -> RedisResult<HashMap<String, String>> {
        let mut state = self.state.lock();
        self.issue(&mut state, format!("HGETALL {}", key))?;

        let fields = Self::with_hash(&mut state, key, false, |fields| {
            Ok(fields.clone().into_iter().collect::<HashMap<_, _>>())
        })?;
        Ok(fields.unwrap_or_default())
    }

    fn ping(&mut self) -> RedisResult<String> {
        let mut state = self.state.lock();
        self.issue(&mut state, "PING".to_string())?;
        Ok("PONG".to_string())
    }
}

// =============================================================================
// Memory Pool
// =============================================================================

/// Pool handing out handles to a shared [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryPool {
    store: MemoryStore,
    outstanding: AtomicU64,
    acquired: AtomicU64,
    fail_acquire: AtomicBool,
    fail_release: AtomicBool,
    fail_close: AtomicBool,
    closed: AtomicBool,
}

impl MemoryPool {
    /// Create a pool over `store`
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    /// The backing store
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Make acquisition fail, as if the server were unreachable
    pub fn fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Make releasing a connection fail
    pub fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    /// Make the first `close` fail
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Connections currently borrowed
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Total connections handed out
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Check if the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ConnectionPool for MemoryPool {
    type Connection = MemoryStore;

    fn acquire(&self) -> Result<Self::Connection> {
        if self.is_closed() {
            return Err(Error::communication("connection pool is closed"));
        }
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(Error::communication(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "Connection refused",
            )));
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }

    fn release(&self, conn: Self::Connection) -> Result<()> {
        drop(conn);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(Error::communication(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "release failed",
            )));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.fail_close.swap(false, Ordering::SeqCst) {
            return Err(Error::close(io::Error::new(
                io::ErrorKind::Other,
                "pool shutdown failed",
            )));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_commands() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set_ex("k", "AQID", 60).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"AQID".to_vec()));
        assert_eq!(store.ttl("k"), Some(60));

        assert!(store.expire("k", 120).unwrap());
        assert_eq!(store.ttl("k"), Some(120));
        assert!(!store.expire("missing", 120).unwrap());

        assert_eq!(
            store.commands(),
            vec![
                "GET k",
                "SET k AQID EX 60",
                "GET k",
                "EXPIRE k 120",
                "EXPIRE missing 120"
            ]
        );
    }

    #[test]
    fn test_hash_commands() {
        let mut store = MemoryStore::new();
        assert_eq!(store.hincr_by("h", "hits", 1).unwrap(), 1);
        assert_eq!(store.hincr_by("h", "hits", 1).unwrap(), 2);
        store.hset("h", "begin", "1700000000000").unwrap();

        assert_eq!(store.hget("h", "begin").unwrap().as_deref(), Some("1700000000000"));
        assert_eq!(store.hget("h", "missing").unwrap(), None);
        assert_eq!(store.hget("nope", "begin").unwrap(), None);

        let all = store.hgetall("h").unwrap();
        assert_eq!(all.get("hits").map(String::as_str), Some("2"));
        assert!(store.hgetall("nope").unwrap().is_empty());
        assert_eq!(store.ttl("h"), None);
    }

    #[test]
    fn test_type_errors() {
        let mut store = MemoryStore::new();
        store.set_ex("k", "AQID", 60).unwrap();
        assert!(store.hincr_by("k", "hits", 1).is_err());

        store.hset("h", "begin", "abc").unwrap();
        assert!(store.get("h").is_err());
        assert!(store.hincr_by("h", "begin", 1).is_err());
    }

    #[test]
    fn test_failure_injection() {
        let mut store = MemoryStore::new();
        store.fail_nth_command(1);

        assert!(store.ping().is_ok());
        assert!(store.ping().is_err());
        assert!(store.ping().is_ok());

        store.fail_command("get");
        assert!(store.get("k").is_err());
        store.heal();
        assert!(store.get("k").is_ok());
    }

    #[test]
    fn test_pool_tracks_connections() {
        let pool = MemoryPool::new(MemoryStore::new());
        let conn = pool.acquire().unwrap();
        assert_eq!(pool.outstanding(), 1);
        pool.release(conn).unwrap();
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.acquired(), 1);

        pool.close().unwrap();
        assert!(pool.acquire().is_err());
    }
}

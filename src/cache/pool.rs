//! Connection Pool
//!
//! Connections are only ever handed out through [`ConnectionPool::with_connection`],
//! which releases the connection on every exit path and reports acquisition
//! and release failures as communication errors.

use crate::cache::commands::StoreCommands;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use r2d2::{CustomizeConnection, Pool, PooledConnection};
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// ConnectionPool Trait
// =============================================================================

/// A bounded pool of store connections
pub trait ConnectionPool: Send + Sync {
    /// Connection type handed to pooled operations
    type Connection: StoreCommands;

    /// Borrow a connection from the pool
    fn acquire(&self) -> Result<Self::Connection>;

    /// Return a connection to the pool
    fn release(&self, conn: Self::Connection) -> Result<()>;

    /// Drain and shut the pool. Calling it again is a no-op.
    fn close(&self) -> Result<()>;

    /// Run `op` on a pooled connection and release it afterwards
    ///
    /// A failing release never replaces an error returned by `op`; it is
    /// only reported when `op` succeeded.
    fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self::Connection) -> Result<T>,
    {
        let mut conn = self.acquire().map_err(into_communication)?;
        let outcome = op(&mut conn);

        match (outcome, self.release(conn)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(into_communication(release_err)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "Dropping connection release failure");
                Err(err)
            }
        }
    }
}

fn into_communication(err: Error) -> Error {
    match err {
        Error::Communication { .. } => err,
        other => Error::communication(other),
    }
}

// =============================================================================
// Pool Settings
// =============================================================================

/// Sizing and timeouts for the Redis pool
///
/// redis-rs sets no command timeout of its own. The defaults follow the
/// 2000 ms connect and socket timeout customary for Redis clients (Jedis
/// `Protocol.DEFAULT_TIMEOUT`) and a pool of 8 connections.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of open connections
    pub max_size: u32,
    /// Maximum time to wait for a connection
    pub connection_timeout: Duration,
    /// Read/write timeout applied to every command
    pub command_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_millis(2000),
            command_timeout: Duration::from_millis(2000),
        }
    }
}

// =============================================================================
// Redis Pool
// =============================================================================

#[derive(Debug)]
struct CommandTimeouts(Duration);

impl CustomizeConnection<redis::Connection, redis::RedisError> for CommandTimeouts {
    fn on_acquire(&self, conn: &mut redis::Connection) -> std::result::Result<(), redis::RedisError> {
        conn.set_read_timeout(Some(self.0))?;
        conn.set_write_timeout(Some(self.0))
    }
}

/// r2d2-backed pool of connections to a single Redis endpoint
pub struct RedisPool {
    pool: RwLock<Option<Pool<redis::Client>>>,
    endpoint: String,
}

impl RedisPool {
    /// Create a pool with default settings
    pub fn new(host: &str, port: u16, password: Option<&str>) -> Result<Self> {
        Self::with_settings(host, port, password, PoolSettings::default())
    }

    /// Create a pool with explicit settings
    ///
    /// No connection is opened here; the first pooled operation connects.
    pub fn with_settings(
        host: &str,
        port: u16,
        password: Option<&str>,
        settings: PoolSettings,
    ) -> Result<Self> {
        let client = redis::Client::open(connection_url(host, port, password).as_str())
            .map_err(|e| Error::Configuration(format!("Invalid Redis endpoint: {}", e)))?;

        let pool = Pool::builder()
            .max_size(settings.max_size)
            .min_idle(Some(0))
            .connection_timeout(settings.connection_timeout)
            .connection_customizer(Box::new(CommandTimeouts(settings.command_timeout)))
            .build_unchecked(client);

        let endpoint = redacted_url(host, port, password.is_some());
        info!(endpoint = %endpoint, max_size = settings.max_size, "Redis pool created");

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            endpoint,
        })
    }

    /// Endpoint with the password masked
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if `close` has been called
    pub fn is_closed(&self) -> bool {
        self.pool.read().is_none()
    }
}

impl ConnectionPool for RedisPool {
    type Connection = PooledConnection<redis::Client>;

    fn acquire(&self) -> Result<Self::Connection> {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or_else(|| Error::communication("connection pool is closed"))?;
        Ok(pool.get()?)
    }

    fn release(&self, conn: Self::Connection) -> Result<()> {
        drop(conn);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.write().take() {
            let state = pool.state();
            debug!(
                endpoint = %self.endpoint,
                connections = state.connections,
                idle = state.idle_connections,
                "Closing Redis pool"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Build the connection URL, percent-encoding the password
fn connection_url(host: &str, port: u16, password: Option<&str>) -> String {
    match password {
        Some(password) => format!(
            "redis://:{}@{}:{}/",
            urlencoding::encode(password),
            host,
            port
        ),
        None => format!("redis://{}:{}/", host, port),
    }
}

/// Connection URL safe for logs
fn redacted_url(host: &str, port: u16, has_password: bool) -> String {
    if has_password {
        format!("redis://:***@{}:{}/", host, port)
    } else {
        format!("redis://{}:{}/", host, port)
    }
}

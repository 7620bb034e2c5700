use super::config::RedisConfig;
use super::connection::RespConnection;
use super::resp::RespValue;
use crate::core::{Result, ShardError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Redis connection pool
///
/// At most `max_active` connections are checked out at once; up to
/// `max_idle` returned connections are kept and reused until they have been
/// idle for longer than `idle_timeout`.
pub struct RespPool {
    config: RedisConfig,
    idle: Arc<Mutex<VecDeque<IdleConnection>>>,
    permits: Arc<Semaphore>,
}

/// A connection waiting in the pool
struct IdleConnection {
    connection: RespConnection<TcpStream>,
    last_used: Instant,
}

impl IdleConnection {
    fn is_idle_too_long(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }
}

impl RespPool {
    pub fn new(config: RedisConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_active));
        Self {
            config,
            idle: Arc::new(Mutex::new(VecDeque::new())),
            permits,
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Check out a connection, dialing a new one when none is idle
    pub async fn get(&self) -> Result<PoolGuard> {
        let permit = tokio::time::timeout(
            self.config.pool_wait_timeout_duration(),
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| ShardError::Store("Connection pool timeout: no connections available".into()))?
        .map_err(|_| ShardError::Store("Connection pool closed".into()))?;

        let connection = match self.take_idle()? {
            Some(connection) => connection,
            None => RespConnection::connect(&self.config).await?,
        };

        Ok(PoolGuard {
            connection: Some(connection),
            idle: Arc::clone(&self.idle),
            max_idle: self.config.max_idle,
            broken: false,
            _permit: permit,
        })
    }

    /// Pops the most recently used idle connection, dropping stale ones
    fn take_idle(&self) -> Result<Option<RespConnection<TcpStream>>> {
        let idle_timeout = self.config.idle_timeout_duration();
        let mut idle = self.idle.lock()?;
        idle.retain(|pooled| !pooled.is_idle_too_long(idle_timeout));
        Ok(idle.pop_back().map(|pooled| pooled.connection))
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().map(|idle| idle.len()).unwrap_or(0);
        PoolStats {
            idle_connections: idle,
            active_connections: self
                .config
                .max_active
                .saturating_sub(self.permits.available_permits()),
            max_active: self.config.max_active,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub idle_connections: usize,
    pub active_connections: usize,
    pub max_active: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} idle",
            self.active_connections, self.max_active, self.idle_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped, unless a transport
/// error or a cancelled call left it in an unknown state.
pub struct PoolGuard {
    connection: Option<RespConnection<TcpStream>>,
    idle: Arc<Mutex<VecDeque<IdleConnection>>>,
    max_idle: usize,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PoolGuard {
    pub async fn call<I, A>(&mut self, args: I) -> Result<RespValue>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ShardError::Store("Connection already returned to pool".into()))?;

        // Stays set if this future is dropped mid-call, so a connection with
        // an unread reply never goes back to the pool.
        self.broken = true;
        let reply = connection.call(args).await?;
        self.broken = false;
        Ok(reply)
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.broken {
            return;
        }
        match self.idle.lock() {
            Ok(mut idle) if idle.len() < self.max_idle => idle.push_back(IdleConnection {
                connection,
                last_used: Instant::now(),
            }),
            Ok(_) => {}
            Err(_) => warn!("Redis pool lock poisoned, dropping connection"),
        }
    }
}

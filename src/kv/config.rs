use crate::connection::config::split_host_port;
use crate::core::{Result, ShardError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`
    pub host: String,

    /// Empty when the server has no `requirepass`
    #[serde(default)]
    pub password: String,

    /// Logical database selected on every new connection
    #[serde(default)]
    pub db: u32,

    /// Idle connections kept for reuse
    pub max_idle: usize,

    /// Upper bound of concurrently checked-out connections
    pub max_active: usize,

    /// Idle connections older than this are closed, in seconds
    pub idle_timeout_secs: u64,

    /// Dial timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long a checkout waits for a free slot when `max_active`
    /// connections are in use, in seconds
    #[serde(default = "default_pool_wait_timeout_secs")]
    pub pool_wait_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_pool_wait_timeout_secs() -> u64 {
    5
}

impl RedisConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            password: String::new(),
            db: 0,
            max_idle: 30,
            max_active: 30,
            idle_timeout_secs: 200,
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_wait_timeout_secs: default_pool_wait_timeout_secs(),
        }
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = timeout.as_secs();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    pub fn pool_wait_timeout(mut self, timeout: Duration) -> Self {
        self.pool_wait_timeout_secs = timeout.as_secs();
        self
    }

    pub fn idle_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pool_wait_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.pool_wait_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        split_host_port(&self.host)?;

        if self.max_idle == 0 {
            return Err(ShardError::Config("max_idle must be > 0".into()));
        }

        if self.max_active == 0 {
            return Err(ShardError::Config("max_active must be > 0".into()));
        }

        if self.idle_timeout_secs == 0 {
            return Err(ShardError::Config("idle_timeout_secs must be > 0".into()));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ShardError::Config("connect_timeout_secs must be > 0".into()));
        }

        if self.pool_wait_timeout_secs == 0 {
            return Err(ShardError::Config("pool_wait_timeout_secs must be > 0".into()));
        }

        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:6379")
    }
}

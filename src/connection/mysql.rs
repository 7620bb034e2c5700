use super::ShardConnector;
use super::config::{ShardClusterConfig, ShardEndpoint};
use crate::core::{Result, ShardError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::debug;

/// Opens one `sqlx` MySQL pool per shard.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    acquire_timeout: Duration,
}

impl MySqlConnector {
    pub fn new() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Bounds how long opening a shard may wait for its first connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn connect_options(endpoint: &ShardEndpoint, config: &ShardClusterConfig) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .charset("utf8mb4")
    }

    /// MySQL has no idle-connection cap, so `max_idle` becomes the number of
    /// connections the pool keeps open.
    pub fn pool_options(&self, config: &ShardClusterConfig) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(config.max_open)
            .min_connections(config.max_idle.min(config.max_open))
            .max_lifetime(config.max_lifetime_duration())
            .acquire_timeout(self.acquire_timeout)
    }
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardConnector for MySqlConnector {
    type Handle = MySqlPool;

    async fn connect(
        &self,
        endpoint: &ShardEndpoint,
        config: &ShardClusterConfig,
    ) -> Result<MySqlPool> {
        debug!(
            "Opening shard {} at {}:{}",
            endpoint.index, endpoint.host, endpoint.port
        );
        // Eager connect: an unreachable shard must fail the whole open.
        self.pool_options(config)
            .connect_with(Self::connect_options(endpoint, config))
            .await
            .map_err(|e| ShardError::Connectivity {
                shard: endpoint.index,
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// shardgate Library
// ============================================================================

pub mod config;
pub mod connection;
pub mod core;
pub mod id;
pub mod kv;
pub mod lock;
pub mod routing;

// Re-export main types for convenience
pub use config::Settings;
pub use crate::core::{Fingerprint, Result, ShardError, ShardIndex};
pub use routing::{FingerprintDeriver, ScatterGather, ShardRouter, fingerprint};

pub use connection::{
    ShardConnector,
    config::{ShardClusterConfig, ShardEndpoint},
    mysql::MySqlConnector,
};
pub use id::{IdGenerator, SnowflakeIdGenerator};
pub use kv::{KeyValueStore, MemoryKvStore, RedisConfig, RedisStore};
pub use lock::{DistributedLock, RetryPolicy};

use std::time::Duration;
use tracing::info;

// ============================================================================
// High-level Cluster API
// ============================================================================

/// A sharded relational store together with its lock store and id source.
///
/// This is the recommended entry point for applications: build it once in
/// `main`, wrap it in an `Arc` and hand it to request handlers.
///
/// # Examples
///
/// ```no_run
/// use shardgate::{Cluster, Settings};
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = Settings::from_file("shardgate.json")?;
/// let cluster = Cluster::connect(settings).await?;
///
/// let pool = cluster.router().resolve("alice@example.com")?;
/// sqlx::query("SELECT 1").execute(pool).await?;
///
/// let id = cluster.next_id()?;
/// let done = cluster
///     .lock()
///     .with_lock("import:alice", Duration::from_secs(30), async move { id })
///     .await;
/// # Ok(())
/// # }
/// ```
pub struct Cluster<C: ShardConnector, S: KeyValueStore> {
    router: ShardRouter<C>,
    lock: DistributedLock<S>,
    ids: SnowflakeIdGenerator,
}

impl<C: ShardConnector, S: KeyValueStore> Cluster<C, S> {
    /// Opens every shard and checks the lock store answers.
    ///
    /// Errors here are startup failures.
    pub async fn open(shards: ShardClusterConfig, connector: C, store: S) -> Result<Self> {
        let ids = SnowflakeIdGenerator::new(shards.worker_id)?;
        let router = ShardRouter::new(shards, connector);
        router.open().await?;
        store.ping().await?;
        info!(
            "Cluster ready: {} shard(s), worker {}",
            router.shard_count(),
            ids.worker_id()
        );
        Ok(Self {
            router,
            lock: DistributedLock::new(store),
            ids,
        })
    }

    pub fn router(&self) -> &ShardRouter<C> {
        &self.router
    }

    pub fn lock(&self) -> &DistributedLock<S> {
        &self.lock
    }

    pub fn ids(&self) -> &SnowflakeIdGenerator {
        &self.ids
    }

    /// Next unique id for a new row.
    pub fn next_id(&self) -> Result<i64> {
        self.ids.next_id()
    }

    /// Shortcut for `lock().try_acquire`.
    pub async fn try_lock(&self, name: &str, ttl: Duration) -> bool {
        self.lock.try_acquire(name, ttl).await
    }

    /// Shortcut for `lock().release`.
    pub async fn unlock(&self, name: &str) -> bool {
        self.lock.release(name).await
    }
}

impl Cluster<MySqlConnector, RedisStore> {
    /// Connects to MySQL shards and Redis as described by `settings`.
    pub async fn connect(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let store = RedisStore::open(settings.kv).await?;
        Self::open(settings.shards, MySqlConnector::new(), store).await
    }
}

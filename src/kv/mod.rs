pub mod config;
pub mod connection;
pub mod memory;
pub mod pool;
pub mod redis;
pub mod resp;

use crate::core::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use config::RedisConfig;
pub use memory::MemoryKvStore;
pub use redis::RedisStore;

/// Shared key-value store backing distributed locks.
///
/// `set_if_absent` must be a single atomic operation on the server; a
/// read-then-write implementation would let two callers both acquire.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Creates `key` with a TTL only if it does not exist.
    ///
    /// Returns `true` iff this call created the entry.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key`, returning `true` iff it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}

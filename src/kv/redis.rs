use super::KeyValueStore;
use super::config::RedisConfig;
use super::pool::{PoolStats, RespPool};
use super::resp::RespValue;
use crate::core::{Result, ShardError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Redis-backed key-value store speaking RESP2 over pooled TCP connections.
pub struct RedisStore {
    pool: RespPool,
}

impl RedisStore {
    /// Validates the configuration and checks the server answers `PING`.
    ///
    /// A failure here is a startup failure; the process should not continue
    /// without its lock store.
    pub async fn open(config: RedisConfig) -> Result<Self> {
        let store = Self::connect_lazy(config)?;
        store.ping().await.map_err(|e| match e {
            ShardError::Unreachable { .. } => e,
            other => ShardError::Unreachable {
                addr: store.pool.config().host.clone(),
                reason: other.to_string(),
            },
        })?;
        info!("Redis store opened at {}", store.pool.config().host);
        Ok(store)
    }

    /// Validates the configuration without dialing the server.
    pub fn connect_lazy(config: RedisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: RespPool::new(config),
        })
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    async fn call<I, A>(&self, args: I) -> Result<RespValue>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let mut connection = self.pool.get().await?;
        connection.call(args).await
    }

    /// `HSET key field value [field value ...]`, returns the number of new fields.
    pub async fn hash_set(&self, key: &str, pairs: &[(&str, &str)]) -> Result<i64> {
        if pairs.is_empty() {
            return Err(ShardError::Store("HSET needs at least one field".into()));
        }
        let mut args = vec!["HSET", key];
        for &(field, value) in pairs {
            args.push(field);
            args.push(value);
        }
        self.call(args).await?.into_integer()
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.call(["HGET", key, field]).await?.into_opt_string()
    }

    /// Values in the order of `fields`, `None` for missing ones.
    pub async fn hash_mget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        let mut args = vec!["HMGET", key];
        args.extend_from_slice(fields);
        self.call(args).await?.into_opt_string_vec()
    }

    /// Returns the number of removed fields.
    pub async fn hash_delete(&self, key: &str, fields: &[&str]) -> Result<i64> {
        let mut args = vec!["HDEL", key];
        args.extend_from_slice(fields);
        self.call(args).await?.into_integer()
    }

    pub async fn hash_exists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self.call(["HEXISTS", key, field]).await?.into_integer()? == 1)
    }

    pub async fn hash_len(&self, key: &str) -> Result<i64> {
        self.call(["HLEN", key]).await?.into_integer()
    }

    pub async fn hash_keys(&self, key: &str) -> Result<Vec<String>> {
        self.call(["HKEYS", key]).await?.into_string_vec()
    }

    pub async fn hash_vals(&self, key: &str) -> Result<Vec<String>> {
        self.call(["HVALS", key]).await?.into_string_vec()
    }

    pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let flat = self.call(["HGETALL", key]).await?.into_string_vec()?;
        if flat.len() % 2 != 0 {
            return Err(ShardError::Protocol(
                "HGETALL returned an odd number of elements".into(),
            ));
        }
        let mut map = HashMap::with_capacity(flat.len() / 2);
        let mut items = flat.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }
}

/// Redis rejects `PX 0`, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> String {
    ttl.as_millis().max(1).to_string()
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let millis = ttl_millis(ttl);
        let reply = self
            .call(["SET", key, value, "PX", millis.as_str(), "NX"])
            .await?
            .into_result()?;
        if reply.is_null() {
            return Ok(false);
        }
        reply.into_ok()?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.call(["DEL", key]).await?.into_integer()? > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.call(["GET", key]).await?.into_opt_string()
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let reply = match ttl {
            Some(ttl) => {
                let millis = ttl_millis(ttl);
                self.call(["SET", key, value, "PX", millis.as_str()]).await?
            }
            None => self.call(["SET", key, value]).await?,
        };
        reply.into_ok()
    }

    async fn ping(&self) -> Result<()> {
        match self.call(["PING"]).await?.into_result()? {
            RespValue::SimpleString(s) if s.as_ref() == b"PONG" => Ok(()),
            other => Err(ShardError::Protocol(format!(
                "unexpected PING reply: {:?}",
                other
            ))),
        }
    }
}

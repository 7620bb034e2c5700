use crate::core::{Result, ShardError, ShardIndex};
use crate::id::MAX_WORKER_ID;
use crate::routing::fingerprint::{DEFAULT_MAX_DIGITS, FingerprintDeriver};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Relational store kinds the router knows how to open.
pub const SUPPORTED_STORE_TYPES: &[&str] = &["mysql"];

/// Sharded relational store configuration
///
/// One entry in `hosts` per shard; the keys must form the dense range
/// `0..hosts.len()` because routing is `fingerprint % shard_count`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardClusterConfig {
    /// Worker id handed to the snowflake generator
    #[serde(default)]
    pub worker_id: i64,

    /// Store kind, currently only `mysql`
    #[serde(rename = "type")]
    pub store_type: String,

    pub user: String,

    pub password: String,

    /// Shard index -> `host:port`
    pub hosts: BTreeMap<ShardIndex, String>,

    /// Database name, identical on every shard
    pub name: String,

    /// Connections kept warm per shard
    pub max_idle: u32,

    /// Upper bound of open connections per shard
    pub max_open: u32,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,

    /// Decimal width of routing fingerprints
    #[serde(default = "default_fingerprint_digits")]
    pub fingerprint_digits: usize,
}

fn default_fingerprint_digits() -> usize {
    DEFAULT_MAX_DIGITS
}

/// Address of a single shard, split out of a `host:port` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEndpoint {
    pub index: ShardIndex,
    pub host: String,
    pub port: u16,
}

impl ShardClusterConfig {
    /// Create a configuration without any shard hosts
    pub fn new(user: &str, password: &str, name: &str) -> Self {
        Self {
            worker_id: 0,
            store_type: "mysql".to_string(),
            user: user.to_string(),
            password: password.to_string(),
            hosts: BTreeMap::new(),
            name: name.to_string(),
            max_idle: 10,
            max_open: 10,
            max_lifetime_secs: 1800,
            fingerprint_digits: DEFAULT_MAX_DIGITS,
        }
    }

    /// Add or replace the host for a shard
    pub fn host(mut self, index: ShardIndex, addr: &str) -> Self {
        self.hosts.insert(index, addr.to_string());
        self
    }

    pub fn worker_id(mut self, worker_id: i64) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn max_idle(mut self, max_idle: u32) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn max_open(mut self, max_open: u32) -> Self {
        self.max_open = max_open;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_secs = lifetime.as_secs();
        self
    }

    pub fn fingerprint_digits(mut self, digits: usize) -> Self {
        self.fingerprint_digits = digits;
        self
    }

    pub fn max_lifetime_duration(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Number of configured shards
    pub fn shard_count(&self) -> u32 {
        self.hosts.len() as u32
    }

    /// Builds the fingerprint deriver matching `fingerprint_digits`
    pub fn deriver(&self) -> Result<FingerprintDeriver> {
        FingerprintDeriver::new(self.fingerprint_digits)
    }

    /// Shard endpoints in index order
    pub fn endpoints(&self) -> Result<Vec<ShardEndpoint>> {
        self.hosts
            .iter()
            .map(|(index, addr)| {
                let (host, port) = split_host_port(addr)?;
                Ok(ShardEndpoint {
                    index: *index,
                    host,
                    port,
                })
            })
            .collect()
    }

    /// Connection string for a shard with the password masked
    pub fn redacted_url(&self, index: ShardIndex) -> Option<String> {
        self.hosts.get(&index).map(|addr| {
            format!(
                "{}://{}:{}@{}/{}",
                self.store_type, self.user, "***", addr, self.name
            )
        })
    }

    /// Validate configuration
    ///
    /// Every field is checked before any connection is attempted.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_STORE_TYPES.contains(&self.store_type.as_str()) {
            return Err(config_error(format!(
                "unsupported store type '{}'",
                self.store_type
            )));
        }

        if self.user.is_empty() {
            return Err(config_error("user cannot be empty"));
        }

        if self.password.is_empty() {
            return Err(config_error("password cannot be empty"));
        }

        if self.name.is_empty() {
            return Err(config_error("database name cannot be empty"));
        }

        if self.hosts.is_empty() {
            return Err(config_error("at least one shard host is required"));
        }

        for (expected, (index, addr)) in self.hosts.iter().enumerate() {
            if *index as usize != expected {
                return Err(config_error(format!(
                    "shard indices must be dense from 0, missing shard {}",
                    expected
                )));
            }
            split_host_port(addr)?;
        }

        if self.max_idle == 0 {
            return Err(config_error("max_idle must be > 0"));
        }

        if self.max_open == 0 {
            return Err(config_error("max_open must be > 0"));
        }

        if self.max_lifetime_secs == 0 {
            return Err(config_error("max_lifetime_secs must be > 0"));
        }

        if !(0..=MAX_WORKER_ID).contains(&self.worker_id) {
            return Err(config_error(format!(
                "worker_id must be in 0..={}",
                MAX_WORKER_ID
            )));
        }

        self.deriver()?;

        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> ShardError {
    ShardError::Config(msg.into())
}

/// Splits a `host:port` address.
pub(crate) fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| config_error(format!("address '{}' must be host:port", addr)))?;
    if host.is_empty() {
        return Err(config_error(format!("address '{}' has an empty host", addr)));
    }
    let port = port
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| config_error(format!("address '{}' has an invalid port", addr)))?;
    Ok((host.to_string(), port))
}

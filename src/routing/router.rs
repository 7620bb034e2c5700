use super::fingerprint::FingerprintDeriver;
use super::scatter::ScatterGather;
use crate::connection::ShardConnector;
use crate::connection::config::ShardClusterConfig;
use crate::core::{Fingerprint, Result, ShardError, ShardIndex};
use futures::future::join_all;
use std::fmt;
use std::future::Future;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Handles of an opened cluster, indexed by shard.
struct ShardMap<H> {
    deriver: FingerprintDeriver,
    handles: Vec<H>,
}

impl<H> ShardMap<H> {
    fn index_for(&self, input: &str) -> Result<ShardIndex> {
        let fingerprint = self.deriver.derive(input)?;
        fingerprint
            .shard_index(self.handles.len() as u32)
            .ok_or(ShardError::NoShards)
    }
}

/// Routes identifying strings to the shard that owns them.
///
/// Placement is `fingerprint(input) % shard_count`, with the shard count
/// fixed when the router is opened. There is no rebalancing: adding or
/// removing a shard moves most keys, so the host map must stay stable for
/// the lifetime of the data. A consistent-hashing ring could replace the
/// modulo step without changing [`ShardRouter::resolve`].
///
/// The router owns no global state; build one per cluster in the
/// application's composition root and share it behind an `Arc`.
pub struct ShardRouter<C: ShardConnector> {
    config: ShardClusterConfig,
    connector: C,
    shards: OnceCell<ShardMap<C::Handle>>,
}

impl<C: ShardConnector> ShardRouter<C> {
    /// Creates a closed router. No connection is attempted until [`open`](Self::open).
    pub fn new(config: ShardClusterConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            shards: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ShardClusterConfig {
        &self.config
    }

    /// Validates the configuration and opens one handle per shard.
    ///
    /// Any failure leaves the router closed and must be treated as fatal by
    /// the caller: routing with a missing shard would misplace every key.
    /// Calling `open` on an open router is a no-op, and concurrent callers
    /// share a single attempt.
    pub async fn open(&self) -> Result<()> {
        self.shards.get_or_try_init(|| self.connect_all()).await?;
        Ok(())
    }

    async fn connect_all(&self) -> Result<ShardMap<C::Handle>> {
        self.config.validate()?;
        let deriver = self.config.deriver()?;

        let endpoints = self.config.endpoints()?;
        let mut handles = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let handle = self
                .connector
                .connect(endpoint, &self.config)
                .await
                .map_err(|e| match e {
                    ShardError::Connectivity { .. } => e,
                    other => ShardError::Connectivity {
                        shard: endpoint.index,
                        reason: other.to_string(),
                    },
                })?;
            handles.push(handle);
        }

        info!(
            "Shard router opened {} shard(s) for database '{}'",
            handles.len(),
            self.config.name
        );
        Ok(ShardMap { deriver, handles })
    }

    pub fn is_open(&self) -> bool {
        self.shards.initialized()
    }

    /// Number of shards captured at open time, 0 while closed.
    pub fn shard_count(&self) -> u32 {
        self.all_handles().len() as u32
    }

    pub fn fingerprint(&self, input: &str) -> Result<Fingerprint> {
        let shards = self.shards.get().ok_or(ShardError::NotOpen)?;
        shards.deriver.derive(input)
    }

    /// Shard index owning `input`.
    pub fn shard_index_for(&self, input: &str) -> Result<ShardIndex> {
        let shards = self.shards.get().ok_or(ShardError::NotOpen)?;
        shards.index_for(input)
    }

    /// Returns the handle of the shard owning `input`.
    pub fn resolve(&self, input: &str) -> Result<&C::Handle> {
        let shards = self.shards.get().ok_or(ShardError::NotOpen)?;
        let index = shards.index_for(input)?;
        debug!("Routed '{}' to shard {}", input, index);
        Ok(&shards.handles[index as usize])
    }

    pub fn handle(&self, index: ShardIndex) -> Option<&C::Handle> {
        self.all_handles().get(index as usize)
    }

    /// Every shard handle in index order; empty while closed.
    pub fn all_handles(&self) -> &[C::Handle] {
        self.shards
            .get()
            .map(|shards| shards.handles.as_slice())
            .unwrap_or(&[])
    }

    /// Runs `query` against every shard concurrently.
    ///
    /// A failing shard never cancels the others; its error is recorded and
    /// the rows of all successful shards are still returned.
    pub async fn scatter_gather<'a, T, E, F, Fut>(&'a self, query: F) -> ScatterGather<T, E>
    where
        F: Fn(ShardIndex, &'a C::Handle) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, E>>,
        E: fmt::Display,
    {
        let pending = self
            .all_handles()
            .iter()
            .enumerate()
            .map(|(index, handle)| {
                let shard = index as ShardIndex;
                let fut = query(shard, handle);
                async move { (shard, fut.await) }
            });

        ScatterGather::collect(join_all(pending).await)
    }
}

pub mod config;
pub mod mysql;

use crate::core::Result;
use async_trait::async_trait;
use config::{ShardClusterConfig, ShardEndpoint};

/// Opens the live handle of one shard.
///
/// The router calls `connect` once per configured shard while opening; the
/// returned handle is expected to manage its own connection pool and to be
/// safe for concurrent use (`sqlx::MySqlPool` is the canonical handle).
#[async_trait]
pub trait ShardConnector: Send + Sync {
    type Handle: Send + Sync + 'static;

    /// Establishes the handle for `endpoint`.
    ///
    /// Implementations must fail rather than hand back a handle that is
    /// known to be unusable: a shard that silently drops out would move
    /// every other key to a different shard.
    async fn connect(
        &self,
        endpoint: &ShardEndpoint,
        config: &ShardClusterConfig,
    ) -> Result<Self::Handle>;
}

//! One memcached client per device-type shard.

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use std::collections::HashMap;
use tracing::info;

use crate::config::{ShardsConfig, StoreConfig};
use crate::error::{StoreError, UnknownShardSnafu};
use crate::router::ShardTarget;
use crate::store::{KvStore, MemcacheClient};

/// Routes writes to the memcached server of each shard.
///
/// Built once per process and shared by every file worker.
pub struct ShardedStore {
    clients: HashMap<ShardTarget, MemcacheClient>,
}

impl ShardedStore {
    /// Build clients for all four shards from configuration.
    pub fn from_config(shards: &ShardsConfig, store: &StoreConfig) -> Self {
        let options = store.memcache_options();
        let clients = ShardTarget::ALL
            .into_iter()
            .map(|shard| {
                let addr = shards.address(shard);
                info!("Shard {} -> memcached {}", shard, addr);
                (shard, MemcacheClient::new(addr, options.clone()))
            })
            .collect();
        Self { clients }
    }
}

#[async_trait]
impl KvStore for ShardedStore {
    async fn set(&self, shard: ShardTarget, key: &str, value: Bytes) -> Result<(), StoreError> {
        let client = self.clients.get(&shard).context(UnknownShardSnafu { shard })?;
        client.set(key, &value).await
    }

    fn describe(&self, shard: ShardTarget) -> String {
        self.clients
            .get(&shard)
            .map(|c| c.addr().to_string())
            .unwrap_or_else(|| shard.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_client_per_shard() {
        let store = ShardedStore::from_config(&ShardsConfig::default(), &StoreConfig::default());
        assert_eq!(store.clients.len(), 4);
        assert_eq!(store.describe(ShardTarget::Idfa), "127.0.0.1:33013");
        assert_eq!(store.describe(ShardTarget::Dvid), "127.0.0.1:33016");
    }
}

//! Key-value store abstraction.
//!
//! The loader only ever needs `set`. `MemcacheClient` speaks to one memcached
//! server; `ShardedStore` fans writes out to the per-shard clients;
//! `MemoryStore` keeps values in process.

pub mod memcache;
pub mod memory;
pub mod sharded;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::StoreError;
use crate::router::ShardTarget;

pub use memcache::{MemcacheClient, MemcacheOptions};
pub use memory::MemoryStore;
pub use sharded::ShardedStore;

/// A store that can persist an opaque value under a key on a given shard.
///
/// Implementations must be safe to share between concurrent file workers.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key` on `shard`, overwriting any previous value.
    async fn set(&self, shard: ShardTarget, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Describe the endpoint behind a shard (for logging).
    fn describe(&self, shard: ShardTarget) -> String {
        shard.to_string()
    }
}

/// Shared reference to a store.
pub type KvStoreRef = Arc<dyn KvStore>;

//! In-process store for tests and local runs.
//!
//! Keeps every value in memory and can be told to fail specific calls, which
//! is how the write-failure policies are exercised without a memcached server.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::{RejectedSnafu, StoreError};
use crate::router::ShardTarget;
use crate::store::KvStore;

/// A [`KvStore`] backed by a hash map.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<(ShardTarget, String), Bytes>>,
    calls: AtomicUsize,
    failing_calls: HashSet<usize>,
    failing_shards: HashSet<ShardTarget>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th call to `set` (1-based, counted across all shards).
    pub fn fail_call(mut self, n: usize) -> Self {
        self.failing_calls.insert(n);
        self
    }

    /// Fail every write to `shard`.
    pub fn fail_shard(mut self, shard: ShardTarget) -> Self {
        self.failing_shards.insert(shard);
        self
    }

    /// Number of `set` calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn get(&self, shard: ShardTarget, key: &str) -> Option<Bytes> {
        self.values
            .lock()
            .await
            .get(&(shard, key.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.lock().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, shard: ShardTarget, key: &str, value: Bytes) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_calls.contains(&call) || self.failing_shards.contains(&shard) {
            return RejectedSnafu {
                addr: format!("memory/{shard}"),
                reply: "SERVER_ERROR injected failure",
            }
            .fail();
        }
        self.values
            .lock()
            .await
            .insert((shard, key.to_string()), value);
        Ok(())
    }

    fn describe(&self, shard: ShardTarget) -> String {
        format!("memory/{shard}")
    }
}

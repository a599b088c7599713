//! Encodes aggregated records and writes them to their shards.

use prost::Message;
use snafu::prelude::*;
use std::time::Instant;
use tracing::{debug, error};

use crate::aggregate::{Aggregated, Routed, StoreKey};
use crate::config::WritePolicy;
use crate::emit;
use crate::encode::{UserApps, encode_payload};
use crate::error::{StoreSnafu, WriteError};
use crate::metrics::events::{EntryFailed, EntryWritten, StoreWriteCompleted};
use crate::store::KvStoreRef;

/// Counts for one file's write pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    /// Keys a write was attempted for.
    pub attempted: usize,
    /// Keys stored (or logged, in dry-run mode).
    pub written: usize,
    /// Keys whose write failed.
    pub failed: usize,
    /// Keys never attempted because the pass was aborted.
    pub skipped: usize,
    /// Message of the first failure, if any.
    pub first_error: Option<String>,
}

impl WriteSummary {
    /// True when every key was written.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// True when the pass stopped before the last key.
    pub fn aborted(&self) -> bool {
        self.skipped > 0
    }
}

/// Writes entries to the store, or logs them in dry-run mode.
#[derive(Clone)]
pub struct ShardWriter {
    store: KvStoreRef,
    dry_run: bool,
    policy: WritePolicy,
}

impl ShardWriter {
    pub fn new(store: KvStoreRef, dry_run: bool, policy: WritePolicy) -> Self {
        Self {
            store,
            dry_run,
            policy,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Write a single entry to its shard.
    ///
    /// In dry-run mode nothing is sent; the key and the payload are logged
    /// and the write always succeeds.
    pub async fn write(&self, key: &StoreKey, routed: &Routed) -> Result<(), WriteError> {
        let shard = routed.shard;

        if self.dry_run {
            let payload = UserApps::from(&routed.record);
            debug!(
                "{} - {} -> {:?} ({} bytes)",
                self.store.describe(shard),
                key,
                payload,
                payload.encoded_len()
            );
            return Ok(());
        }

        let packed = encode_payload(&routed.record);
        let bytes = packed.len();
        let start = Instant::now();
        self.store
            .set(shard, key.as_str(), packed)
            .await
            .context(StoreSnafu {
                key: key.as_str(),
                shard,
            })?;

        emit!(StoreWriteCompleted {
            shard,
            duration: start.elapsed()
        });
        emit!(EntryWritten { shard, bytes });
        Ok(())
    }

    /// Write every entry of a file in map order, applying the write policy.
    pub async fn write_all(&self, entries: &Aggregated) -> WriteSummary {
        let mut summary = WriteSummary::default();

        for (idx, (key, routed)) in entries.iter().enumerate() {
            summary.attempted += 1;

            let Err(e) = self.write(key, routed).await else {
                summary.written += 1;
                continue;
            };

            let WriteError::Store { shard, source, .. } = &e;
            error!(
                "Cannot write to memc {}: {}: {}",
                self.store.describe(*shard),
                e,
                source
            );
            emit!(EntryFailed { shard: *shard });
            summary.failed += 1;
            summary
                .first_error
                .get_or_insert_with(|| format!("{e}: {source}"));

            if self.policy == WritePolicy::AbortOnFirstError {
                summary.skipped = entries.len() - idx - 1;
                break;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::aggregate::aggregate;
    use crate::router::ShardTarget;
    use crate::source::DeviceRecord;
    use crate::store::MemoryStore;

    fn entries(n: usize) -> Aggregated {
        aggregate((0..n).map(|i| Routed {
            shard: ShardTarget::Gaid,
            record: DeviceRecord {
                device_type: "gaid".to_string(),
                device_id: format!("dev{i}"),
                lat: 10.0,
                lon: 20.0,
                apps: vec![i as u32],
            },
        }))
    }

    #[tokio::test]
    async fn test_writes_every_entry() {
        let store = Arc::new(MemoryStore::new());
        let writer = ShardWriter::new(store.clone(), false, WritePolicy::AbortOnFirstError);

        let summary = writer.write_all(&entries(3)).await;

        assert!(summary.is_success());
        assert_eq!(summary.written, 3);
        assert_eq!(store.len().await, 3);
        assert!(store.get(ShardTarget::Gaid, "gaid:dev1").await.is_some());
    }

    #[tokio::test]
    async fn test_abort_on_first_error() {
        let store = Arc::new(MemoryStore::new().fail_call(5));
        let writer = ShardWriter::new(store.clone(), false, WritePolicy::AbortOnFirstError);

        let summary = writer.write_all(&entries(10)).await;

        assert_eq!(summary.written, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 5);
        assert_eq!(summary.attempted, 5);
        assert!(summary.aborted());
        assert!(summary.first_error.unwrap().contains("gaid:dev4"));
        assert_eq!(store.calls(), 5);
    }

    #[tokio::test]
    async fn test_best_effort_continues() {
        let store = Arc::new(MemoryStore::new().fail_call(5));
        let writer = ShardWriter::new(store.clone(), false, WritePolicy::BestEffort);

        let summary = writer.write_all(&entries(10)).await;

        assert_eq!(summary.written, 9);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert!(!summary.is_success());
        assert_eq!(store.calls(), 10);
    }

    #[tokio::test]
    async fn test_dry_run_never_touches_store() {
        let store = Arc::new(MemoryStore::new().fail_shard(ShardTarget::Gaid));
        let writer = ShardWriter::new(store.clone(), true, WritePolicy::AbortOnFirstError);

        let summary = writer.write_all(&entries(4)).await;

        assert!(summary.is_success());
        assert_eq!(summary.written, 4);
        assert_eq!(store.calls(), 0);
    }
}

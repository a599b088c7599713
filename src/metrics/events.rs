//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the loader.
//! Events implement the `InternalEvent` trait which records the corresponding
//! Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use crate::router::ShardTarget;
use crate::source::DropReason;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when input files are discovered.
pub struct FilesDiscovered {
    pub count: usize,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(count = self.count, "Files discovered");
        counter!("memc_load_files_discovered_total").increment(self.count as u64);
    }
}

/// Event emitted when compressed bytes are read from disk.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("memc_load_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when rows are parsed into device records.
pub struct RecordsParsed {
    pub count: u64,
}

impl InternalEvent for RecordsParsed {
    fn emit(self) {
        trace!(count = self.count, "Records parsed");
        counter!("memc_load_records_parsed_total").increment(self.count);
    }
}

/// Event emitted when a row is dropped by the parser.
pub struct RecordDropped {
    pub reason: DropReason,
}

impl InternalEvent for RecordDropped {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), "Record dropped");
        counter!("memc_load_records_dropped_total", "reason" => self.reason.as_str()).increment(1);
    }
}

/// Event emitted when a record has a device type with no shard.
pub struct UnknownDeviceType;

impl InternalEvent for UnknownDeviceType {
    fn emit(self) {
        trace!("Unknown device type");
        counter!("memc_load_records_dropped_total", "reason" => "unknown_device_type").increment(1);
    }
}

/// Event emitted when an entry is stored.
pub struct EntryWritten {
    pub shard: ShardTarget,
    pub bytes: usize,
}

impl InternalEvent for EntryWritten {
    fn emit(self) {
        trace!(shard = self.shard.as_str(), bytes = self.bytes, "Entry written");
        counter!("memc_load_entries_written_total", "shard" => self.shard.as_str()).increment(1);
        counter!("memc_load_bytes_written_total", "shard" => self.shard.as_str())
            .increment(self.bytes as u64);
    }
}

/// Event emitted when a store write fails.
pub struct EntryFailed {
    pub shard: ShardTarget,
}

impl InternalEvent for EntryFailed {
    fn emit(self) {
        trace!(shard = self.shard.as_str(), "Entry failed");
        counter!("memc_load_entries_failed_total", "shard" => self.shard.as_str()).increment(1);
    }
}

/// Status of a processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
        }
    }
}

/// Event emitted when an input file finishes processing.
pub struct FileProcessed {
    pub status: FileStatus,
}

impl InternalEvent for FileProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "File processed");
        counter!("memc_load_files_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when file decompression completes.
pub struct FileDecompressionCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileDecompressionCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File decompression completed"
        );
        histogram!("memc_load_file_decompression_duration_seconds")
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a single store write completes.
pub struct StoreWriteCompleted {
    pub shard: ShardTarget,
    pub duration: Duration,
}

impl InternalEvent for StoreWriteCompleted {
    fn emit(self) {
        histogram!("memc_load_store_write_duration_seconds", "shard" => self.shard.as_str())
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a whole file has been processed.
pub struct FileProcessingCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileProcessingCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File processing completed"
        );
        histogram!("memc_load_file_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Gauge events for concurrency
// ============================================================================

/// Event emitted when the number of in-flight file workers changes.
pub struct ActiveFiles {
    pub count: usize,
}

impl InternalEvent for ActiveFiles {
    fn emit(self) {
        trace!(count = self.count, "Active files");
        gauge!("memc_load_active_files").set(self.count as f64);
    }
}

//! Per-file worker.
//!
//! Reading and parsing run on the blocking pool; writes are async. A worker
//! owns everything it builds, so nothing is shared between files except the
//! store and the manifest.

use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::marker::mark_processed;
use crate::aggregate::{Routed, aggregate};
use crate::emit;
use crate::error::{LoaderError, ReaderError, ReaderSnafu, TaskJoinSnafu};
use crate::manifest::{FileOutcome, Manifest};
use crate::metrics::events::{
    FileProcessed, FileProcessingCompleted, FileStatus, RecordDropped, RecordsParsed,
    UnknownDeviceType,
};
use crate::router::ShardTarget;
use crate::sink::{ShardWriter, WriteSummary};
use crate::source::{TsvReader, decode_fields, parse_record};

/// Shared, read-only state handed to every worker.
pub(super) struct WorkerContext {
    pub reader: TsvReader,
    pub writer: ShardWriter,
    pub max_error_rate: f64,
    pub manifest: Option<Arc<Manifest>>,
}

/// Parsed and routed rows of one file.
#[derive(Debug, Default)]
pub(super) struct ParsedFile {
    pub rows: usize,
    pub routed: Vec<Routed>,
    pub dropped: usize,
    pub unknown_device_types: usize,
}

/// Outcome of one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub marked_path: Option<PathBuf>,
    /// Raw rows read from the file.
    pub rows: usize,
    /// Distinct keys after aggregation.
    pub entries: usize,
    pub dropped: usize,
    pub unknown_device_types: usize,
    pub write: WriteSummary,
    pub error_rate: f64,
    pub status: FileStatus,
}

impl FileReport {
    fn to_outcome(&self, dry_run: bool) -> FileOutcome {
        FileOutcome {
            path: self.path.display().to_string(),
            marked_path: self.marked_path.as_ref().map(|p| p.display().to_string()),
            status: self.status,
            entries: self.entries,
            written: self.write.written,
            failed: self.write.failed,
            dropped: self.dropped,
            unknown_device_types: self.unknown_device_types,
            error_rate: self.error_rate,
            dry_run,
            error: self.write.first_error.clone(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Read a file and turn its rows into routed records.
pub(super) fn parse_file(reader: &TsvReader, path: &Path) -> Result<ParsedFile, ReaderError> {
    let result = reader.read_path(path)?;
    let mut parsed = ParsedFile {
        rows: result.rows.len(),
        ..Default::default()
    };

    for row in &result.rows {
        let record = match decode_fields(row).and_then(|fields| parse_record(&fields)) {
            Ok(record) => record,
            Err(reason) => {
                parsed.dropped += 1;
                emit!(RecordDropped { reason });
                continue;
            }
        };

        let Some(shard) = ShardTarget::route(&record.device_type) else {
            error!("Unknown device type: {}", record.device_type);
            parsed.unknown_device_types += 1;
            emit!(UnknownDeviceType);
            continue;
        };
        parsed.routed.push(Routed { shard, record });
    }

    emit!(RecordsParsed {
        count: parsed.routed.len() as u64
    });
    Ok(parsed)
}

/// `(unknown + failed + skipped) / (entries + unknown)`, or 0 with nothing to load.
pub fn error_rate(entries: usize, unknown: usize, write: &WriteSummary) -> f64 {
    let total = entries + unknown;
    if total == 0 {
        return 0.0;
    }
    (unknown + write.failed + write.skipped) as f64 / total as f64
}

/// Load one file into the store. Does not rename it.
pub(super) async fn process_file(
    path: PathBuf,
    ctx: &WorkerContext,
) -> Result<FileReport, LoaderError> {
    let start = Instant::now();
    info!("Processing {}", path.display());

    let reader = ctx.reader;
    let (path, parsed) = tokio::task::spawn_blocking(move || {
        let parsed = parse_file(&reader, &path);
        (path, parsed)
    })
    .await
    .context(TaskJoinSnafu)?;
    let parsed = parsed.context(ReaderSnafu)?;

    let entries = aggregate(parsed.routed);
    debug!(
        "{}: {} rows, {} keys, {} dropped",
        path.display(),
        parsed.rows,
        entries.len(),
        parsed.dropped
    );

    let write = ctx.writer.write_all(&entries).await;
    if write.failed == 0 && write.skipped == 0 {
        info!(
            "Processed {} entries successfully (written={})",
            entries.len(),
            write.written
        );
    } else {
        error!(
            "Failed to process {} entries (written={}, failed={}, skipped={})",
            entries.len(),
            write.written,
            write.failed,
            write.skipped
        );
    }

    let rate = error_rate(entries.len(), parsed.unknown_device_types, &write);
    let mut acceptable = true;
    if entries.len() + parsed.unknown_device_types > 0 {
        if ctx.writer.is_dry_run() {
            info!("Error rate ({}). Dry run, nothing loaded", rate);
        } else if rate < ctx.max_error_rate {
            info!("Acceptable error rate ({}). Successful load", rate);
        } else {
            error!(
                "High error rate ({} > {}). Failed load",
                rate, ctx.max_error_rate
            );
            acceptable = false;
        }
    }

    let status = if acceptable && !write.aborted() {
        FileStatus::Success
    } else {
        FileStatus::Failed
    };
    emit!(FileProcessed { status });
    emit!(FileProcessingCompleted {
        duration: start.elapsed()
    });

    Ok(FileReport {
        path,
        marked_path: None,
        rows: parsed.rows,
        entries: entries.len(),
        dropped: parsed.dropped,
        unknown_device_types: parsed.unknown_device_types,
        write,
        error_rate: rate,
        status,
    })
}

/// Process a file, mark it and record its outcome.
///
/// A reader failure returns before the rename, so the file stays eligible for
/// the next run.
pub(super) async fn run_file(
    path: PathBuf,
    ctx: Arc<WorkerContext>,
) -> Result<FileReport, LoaderError> {
    let mut report = process_file(path, &ctx).await?;
    report.marked_path = mark_processed(&report.path);

    if let Some(manifest) = &ctx.manifest {
        manifest
            .record(report.to_outcome(ctx.writer.is_dry_run()))
            .await;
    }
    Ok(report)
}

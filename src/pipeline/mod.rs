//! File orchestration.
//!
//! Discovers input files and runs one worker per file with a bounded number
//! in flight. Each worker reads, parses, aggregates and writes its file, then
//! marks it processed. A reader failure ends the run: the other in-flight
//! workers are aborted and no further files are started.
//!
//! # Architecture
//!
//! - **Tokio tasks**: one per file, refilled as workers finish
//! - **Tokio's blocking thread pool**: decompression and parsing (CPU bound)
//! - **Async store writes**: sequential per file, in first-seen key order

pub mod marker;
mod worker;

use futures::stream::{FuturesUnordered, StreamExt};
use snafu::prelude::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{
    AddressParseSnafu, ConfigSnafu, InvalidPatternSnafu, LoaderError, MetricsSnafu, TaskJoinSnafu,
};
use crate::manifest::Manifest;
use crate::metrics::events::{ActiveFiles, FileStatus, FilesDiscovered};
use crate::sink::ShardWriter;
use crate::source::TsvReader;
use crate::store::{KvStoreRef, ShardedStore};

pub use marker::{is_marked, mark_processed};
pub use worker::{FileReport, error_rate};

use worker::{WorkerContext, run_file};

/// Totals for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub rows: usize,
    pub entries: usize,
    pub written: usize,
    pub failed: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub unknown_device_types: usize,
}

impl RunStats {
    fn add(&mut self, report: &FileReport) {
        self.files_processed += 1;
        match report.status {
            FileStatus::Success => self.files_succeeded += 1,
            FileStatus::Failed => self.files_failed += 1,
        }
        self.rows += report.rows;
        self.entries += report.entries;
        self.written += report.write.written;
        self.failed += report.write.failed;
        self.skipped += report.write.skipped;
        self.dropped += report.dropped;
        self.unknown_device_types += report.unknown_device_types;
    }
}

/// Expand `pattern`, sorted, leaving out files already marked as processed.
pub fn discover_files(pattern: &str) -> Result<Vec<PathBuf>, LoaderError> {
    let paths = glob::glob(pattern)
        .context(InvalidPatternSnafu { pattern })
        .context(ConfigSnafu)?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if is_marked(&path) => {
                debug!("Skipping processed file {}", path.display());
            }
            Ok(path) if path.is_file() => files.push(path),
            Ok(path) => debug!("Skipping non-file {}", path.display()),
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }
    files.sort();
    Ok(files)
}

/// Runs every discovered file through a worker.
pub struct Loader {
    config: Config,
    store: KvStoreRef,
}

impl Loader {
    pub fn new(config: Config, store: KvStoreRef) -> Self {
        Self { config, store }
    }

    /// Process all matching files and return the run totals.
    pub async fn run(&self) -> Result<RunStats, LoaderError> {
        let files = discover_files(&self.config.source.pattern)?;
        emit!(FilesDiscovered { count: files.len() });

        let mut stats = RunStats {
            files_discovered: files.len(),
            ..Default::default()
        };
        if files.is_empty() {
            warn!("No files match {}", self.config.source.pattern);
            return Ok(stats);
        }
        info!("Found {} files to process", files.len());

        let manifest = match Manifest::from_config(&self.config.manifest).await {
            Ok(manifest) => manifest.map(Arc::new),
            Err(e) => {
                error!("Manifest disabled: {}", e);
                None
            }
        };

        let write = &self.config.write;
        let ctx = Arc::new(WorkerContext {
            reader: TsvReader::new(self.config.source.compression),
            writer: ShardWriter::new(self.store.clone(), write.dry_run, write.policy),
            max_error_rate: write.max_error_rate,
            manifest: manifest.clone(),
        });

        let result = self.run_workers(files, ctx, &mut stats).await;

        if let Some(manifest) = &manifest
            && let Err(e) = manifest.finalize().await
        {
            error!("Failed to finalize manifest: {}", e);
        }

        result.map(|()| stats)
    }

    async fn run_workers(
        &self,
        files: Vec<PathBuf>,
        ctx: Arc<WorkerContext>,
        stats: &mut RunStats,
    ) -> Result<(), LoaderError> {
        let max_concurrent = match self.config.source.max_concurrent_files {
            0 => files.len(),
            n => n,
        };

        let mut workers: FuturesUnordered<JoinHandle<Result<FileReport, LoaderError>>> =
            FuturesUnordered::new();
        let mut pending = files.into_iter();

        for path in pending.by_ref().take(max_concurrent) {
            workers.push(tokio::spawn(run_file(path, ctx.clone())));
        }
        emit!(ActiveFiles {
            count: workers.len()
        });

        while let Some(joined) = workers.next().await {
            let outcome = joined.context(TaskJoinSnafu).and_then(|r| r);
            let report = match outcome {
                Ok(report) => report,
                Err(e) => {
                    error!("Aborting run: {}", e);
                    for worker in workers.iter() {
                        worker.abort();
                    }
                    emit!(ActiveFiles { count: 0 });
                    return Err(e);
                }
            };

            debug!(
                "[-] Finished {} ({})",
                report.path.display(),
                report.status.as_str()
            );
            stats.add(&report);

            if let Some(next) = pending.next() {
                workers.push(tokio::spawn(run_file(next, ctx.clone())));
            }
            emit!(ActiveFiles {
                count: workers.len()
            });
        }

        Ok(())
    }
}

/// Build the store and metrics endpoint from `config` and run the loader.
pub async fn run_loader(config: Config) -> Result<RunStats, LoaderError> {
    let metrics = if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .address
            .parse()
            .context(AddressParseSnafu)?;
        let server = crate::metrics::init(addr)
            .await
            .context(MetricsSnafu)?;
        info!("Metrics served on http://{}/metrics", server.local_addr());
        Some(server)
    } else {
        None
    };

    if config.write.dry_run {
        info!("Dry run: nothing will be written to memcached");
    }

    let store: KvStoreRef = Arc::new(ShardedStore::from_config(&config.shards, &config.store));
    let result = Loader::new(config, store).run().await;

    if let Some(server) = metrics {
        server.shutdown().await;
    }

    let stats = result?;
    info!(
        "Finished processing files: {} processed ({} succeeded, {} failed), {} written, {} dropped",
        stats.files_processed,
        stats.files_succeeded,
        stats.files_failed,
        stats.written,
        stats.dropped
    );
    Ok(stats)
}

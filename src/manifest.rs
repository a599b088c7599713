//! Per-file outcome log.
//!
//! Every attempted file appends one `FileOutcome` as NDJSON to the configured
//! manifest, so a run that renamed a file after a failed load still leaves a
//! record of what happened to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::ManifestConfig;
use crate::error::{ManifestError, ManifestIoSnafu, ManifestSerializeSnafu};
use crate::metrics::events::FileStatus;

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    /// Path the file was discovered under.
    pub path: String,
    /// Path after the completion rename, if it succeeded.
    pub marked_path: Option<String>,
    pub status: FileStatus,
    /// Distinct keys after aggregation.
    pub entries: usize,
    pub written: usize,
    pub failed: usize,
    /// Rows dropped by the parser.
    pub dropped: usize,
    pub unknown_device_types: usize,
    pub error_rate: f64,
    pub dry_run: bool,
    /// First write error, if any.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Totals by status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestStats {
    pub success: usize,
    pub failed: usize,
}

impl ManifestStats {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

/// Buffered NDJSON appender for file outcomes.
pub struct Manifest {
    path: PathBuf,
    buffer: Mutex<Vec<FileOutcome>>,
    stats: Mutex<ManifestStats>,
    buffer_size: usize,
}

impl Manifest {
    /// Open the manifest described by `config`.
    ///
    /// Returns `None` if no manifest path is configured.
    pub async fn from_config(config: &ManifestConfig) -> Result<Option<Self>, ManifestError> {
        let Some(path) = &config.path else {
            return Ok(None);
        };
        let path = PathBuf::from(path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context(ManifestIoSnafu {
                    path: path.display().to_string(),
                })?;
        }

        info!("Manifest enabled: {}", path.display());

        Ok(Some(Self {
            path,
            buffer: Mutex::new(Vec::new()),
            stats: Mutex::new(ManifestStats::default()),
            buffer_size: config.buffer_size.max(1),
        }))
    }

    /// Queue an outcome, flushing when the buffer is full.
    pub async fn record(&self, outcome: FileOutcome) {
        debug!(
            "Recording outcome for {}: {}",
            outcome.path,
            outcome.status.as_str()
        );

        {
            let mut stats = self.stats.lock().await;
            match outcome.status {
                FileStatus::Success => stats.success += 1,
                FileStatus::Failed => stats.failed += 1,
            }
        }

        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(outcome);
            buffer.len() >= self.buffer_size
        };

        if should_flush && let Err(e) = self.flush().await {
            error!("Failed to flush manifest: {}", e);
        }
    }

    /// Append buffered outcomes to the manifest file.
    pub async fn flush(&self) -> Result<(), ManifestError> {
        let records = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };

        let mut ndjson = String::new();
        for record in &records {
            let line = serde_json::to_string(record).context(ManifestSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        let path = self.path.display().to_string();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(ManifestIoSnafu { path: &path })?;
        file.write_all(ndjson.as_bytes())
            .await
            .context(ManifestIoSnafu { path: &path })?;
        file.flush().await.context(ManifestIoSnafu { path: &path })?;

        debug!("Flushed {} manifest records", records.len());
        Ok(())
    }

    pub async fn stats(&self) -> ManifestStats {
        self.stats.lock().await.clone()
    }

    /// Flush what is left and log the totals.
    pub async fn finalize(&self) -> Result<ManifestStats, ManifestError> {
        self.flush().await?;
        let stats = self.stats().await;
        info!(
            "Manifest finalized: {} files (success={}, failed={})",
            stats.total(),
            stats.success,
            stats.failed
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome(path: &str, status: FileStatus) -> FileOutcome {
        FileOutcome {
            path: path.to_string(),
            marked_path: Some(format!(".{path}")),
            status,
            entries: 3,
            written: 3,
            failed: 0,
            dropped: 1,
            unknown_device_types: 0,
            error_rate: 0.0,
            dry_run: false,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn config(path: Option<String>, buffer_size: usize) -> ManifestConfig {
        ManifestConfig { path, buffer_size }
    }

    #[tokio::test]
    async fn test_none_without_path() {
        let manifest = Manifest::from_config(&config(None, 100)).await.unwrap();
        assert!(manifest.is_none());
    }

    #[tokio::test]
    async fn test_finalize_writes_ndjson() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/outcomes.ndjson");
        let manifest = Manifest::from_config(&config(Some(path.display().to_string()), 100))
            .await
            .unwrap()
            .unwrap();

        manifest.record(outcome("a.tsv.gz", FileStatus::Success)).await;
        manifest.record(outcome("b.tsv.gz", FileStatus::Failed)).await;
        assert!(!path.exists());

        let stats = manifest.finalize().await.unwrap();
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failed, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<FileOutcome> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].path, "a.tsv.gz");
        assert_eq!(lines[1].status, FileStatus::Failed);
        assert!(content.contains("\"status\":\"failed\""));
    }

    #[tokio::test]
    async fn test_flushes_when_buffer_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outcomes.ndjson");
        let manifest = Manifest::from_config(&config(Some(path.display().to_string()), 2))
            .await
            .unwrap()
            .unwrap();

        manifest.record(outcome("a", FileStatus::Success)).await;
        manifest.record(outcome("b", FileStatus::Success)).await;
        manifest.record(outcome("c", FileStatus::Success)).await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        manifest.finalize().await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_appends_across_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outcomes.ndjson");
        let cfg = config(Some(path.display().to_string()), 100);

        for name in ["first", "second"] {
            let manifest = Manifest::from_config(&cfg).await.unwrap().unwrap();
            manifest.record(outcome(name, FileStatus::Success)).await;
            manifest.finalize().await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}

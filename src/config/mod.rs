//! Loader configuration.
//!
//! Everything has a default, so the loader runs without a config file. When a
//! YAML file is given it is interpolated against the environment first, and
//! command-line flags are applied on top by `main`.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyPatternSnafu, EmptyShardAddressSnafu, EnvInterpolationSnafu,
    InvalidErrorRateSnafu, InvalidPatternSnafu, ReadFileSnafu, YamlParseSnafu,
};
use crate::router::ShardTarget;
use crate::store::MemcacheOptions;

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Main configuration structure for the loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub shards: ShardsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub write: WriteConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where input files come from and how many are processed at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Glob pattern selecting input files.
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Compression format of input files.
    #[serde(default)]
    pub compression: CompressionFormat,

    /// Maximum number of files processed concurrently (0 = one worker per file).
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            compression: CompressionFormat::default(),
            max_concurrent_files: default_max_concurrent_files(),
        }
    }
}

fn default_pattern() -> String {
    "/data/appsinstalled/*.tsv.gz".to_string()
}

fn default_max_concurrent_files() -> usize {
    4
}

/// Compression format of input files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    None,
    #[default]
    Gzip,
}

/// memcached address (`host:port`) for each shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardsConfig {
    #[serde(default = "default_idfa")]
    pub idfa: String,
    #[serde(default = "default_gaid")]
    pub gaid: String,
    #[serde(default = "default_adid")]
    pub adid: String,
    #[serde(default = "default_dvid")]
    pub dvid: String,
}

impl ShardsConfig {
    pub fn address(&self, shard: ShardTarget) -> &str {
        match shard {
            ShardTarget::Idfa => &self.idfa,
            ShardTarget::Gaid => &self.gaid,
            ShardTarget::Adid => &self.adid,
            ShardTarget::Dvid => &self.dvid,
        }
    }

    pub fn address_mut(&mut self, shard: ShardTarget) -> &mut String {
        match shard {
            ShardTarget::Idfa => &mut self.idfa,
            ShardTarget::Gaid => &mut self.gaid,
            ShardTarget::Adid => &mut self.adid,
            ShardTarget::Dvid => &mut self.dvid,
        }
    }
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self {
            idfa: default_idfa(),
            gaid: default_gaid(),
            adid: default_adid(),
            dvid: default_dvid(),
        }
    }
}

fn default_idfa() -> String {
    "127.0.0.1:33013".to_string()
}

fn default_gaid() -> String {
    "127.0.0.1:33014".to_string()
}

fn default_adid() -> String {
    "127.0.0.1:33015".to_string()
}

fn default_dvid() -> String {
    "127.0.0.1:33016".to_string()
}

/// memcached client tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connect and request timeout in milliseconds (default: 500).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Idle connections kept per shard (default: 8).
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,

    /// Largest encoded value sent to memcached (default: 1MB).
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

impl StoreConfig {
    pub fn memcache_options(&self) -> MemcacheOptions {
        MemcacheOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            max_idle_connections: self.max_idle_connections,
            max_value_bytes: self.max_value_bytes,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_idle_connections: default_max_idle_connections(),
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_max_idle_connections() -> usize {
    8
}

fn default_max_value_bytes() -> usize {
    MB
}

/// Write behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Log intended writes instead of sending them.
    #[serde(default)]
    pub dry_run: bool,

    /// What to do with the rest of a file after a failed write.
    #[serde(default)]
    pub policy: WritePolicy,

    /// Error rate at or above which a file load is reported failed (default: 0.01).
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            policy: WritePolicy::default(),
            max_error_rate: default_max_error_rate(),
        }
    }
}

fn default_max_error_rate() -> f64 {
    0.01
}

/// Failure handling inside one file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Stop writing the file at the first failed key.
    #[default]
    AbortOnFirstError,
    /// Count the failure and keep writing the remaining keys.
    BestEffort,
}

/// Per-file outcome manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// NDJSON file that receives one outcome line per attempted file.
    #[serde(default)]
    pub path: Option<String>,

    /// Records buffered before a flush (default: 100).
    #[serde(default = "default_manifest_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: None,
            buffer_size: default_manifest_buffer_size(),
        }
    }
}

fn default_manifest_buffer_size() -> usize {
    100
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is served (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            vars::interpolate(&content).map_err(|errors| {
                EnvInterpolationSnafu {
                    message: errors.join("\n"),
                }
                .build()
            })?
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.pattern.is_empty(), EmptyPatternSnafu);
        glob::Pattern::new(&self.source.pattern).context(InvalidPatternSnafu {
            pattern: self.source.pattern.clone(),
        })?;

        for shard in ShardTarget::ALL {
            ensure!(
                !self.shards.address(shard).trim().is_empty(),
                EmptyShardAddressSnafu { shard }
            );
        }

        let rate = self.write.max_error_rate;
        ensure!(
            (0.0..=1.0).contains(&rate),
            InvalidErrorRateSnafu { value: rate }
        );
        Ok(())
    }
}

//! Error types for memc-load using snafu.
//!
//! Each stage of the loader owns an error enum with context selectors.
//! `LoaderError` aggregates the ones that can end a run.

use snafu::prelude::*;

use crate::router::ShardTarget;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Input glob pattern is empty.
    #[snafu(display("Input pattern cannot be empty"))]
    EmptyPattern,

    /// Input glob pattern is malformed.
    #[snafu(display("Invalid input pattern: {pattern}"))]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// A shard has no address configured.
    #[snafu(display("Shard {shard} has no address configured"))]
    EmptyShardAddress { shard: ShardTarget },

    /// Error rate threshold outside of [0, 1].
    #[snafu(display("max_error_rate must be within [0, 1], got {value}"))]
    InvalidErrorRate { value: f64 },
}

// ============ Reader Errors ============

/// Errors raised while loading an input file into memory.
///
/// All of these are fatal for the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// The input file could not be opened or read.
    #[snafu(display("Failed to open {path}"))]
    OpenFile {
        source: std::io::Error,
        path: String,
    },

    /// The gzip stream is corrupt or truncated.
    #[snafu(display("Gzip decompression failed for {path}"))]
    GzipDecompression {
        source: std::io::Error,
        path: String,
    },

    /// The decompressed table could not be read.
    #[snafu(display("Failed to read table from {path}"))]
    TableRead { source: csv::Error, path: String },
}

// ============ Store Errors ============

/// Errors returned by a key-value store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// TCP connect failed.
    #[snafu(display("Failed to connect to {addr}"))]
    Connect {
        source: std::io::Error,
        addr: String,
    },

    /// IO error on an established connection.
    #[snafu(display("IO error talking to {addr}"))]
    Io {
        source: std::io::Error,
        addr: String,
    },

    /// The server did not answer in time.
    #[snafu(display("Timed out talking to {addr}"))]
    Timeout { addr: String },

    /// Key cannot be sent over the memcached text protocol.
    #[snafu(display("Invalid memcached key: {key:?}"))]
    InvalidKey { key: String },

    /// Value exceeds the configured item size.
    #[snafu(display("Value of {size} bytes exceeds limit of {limit} bytes"))]
    ValueTooLarge { size: usize, limit: usize },

    /// Server answered with something other than STORED.
    #[snafu(display("Server {addr} rejected write: {reply}"))]
    Rejected { addr: String, reply: String },

    /// No client registered for the shard.
    #[snafu(display("No store configured for shard {shard}"))]
    UnknownShard { shard: ShardTarget },
}

// ============ Write Errors ============

/// Errors raised by the writer for a single key.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteError {
    /// Store rejected or failed the write.
    #[snafu(display("Cannot write {key} to {shard}"))]
    Store {
        key: String,
        shard: ShardTarget,
        source: StoreError,
    },
}

// ============ Self-check Errors ============

/// Errors raised by the payload self-check.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SelfCheckError {
    /// A built-in sample row did not parse.
    #[snafu(display("Sample row {line} did not parse"))]
    SampleRow { line: usize },

    /// An encoded payload could not be decoded.
    #[snafu(display("Payload for {key} does not decode"))]
    PayloadDecode {
        key: String,
        source: prost::DecodeError,
    },

    /// A payload decoded to something other than what was encoded.
    #[snafu(display("Payload for {key} changed after a round trip"))]
    PayloadMismatch { key: String },
}

// ============ Manifest Errors ============

/// Errors that can occur while persisting file outcomes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ManifestError {
    /// Failed to write the manifest file.
    #[snafu(display("Failed to write manifest {path}"))]
    ManifestIo {
        source: std::io::Error,
        path: String,
    },

    /// Failed to serialize an outcome record.
    #[snafu(display("Failed to serialize manifest record"))]
    ManifestSerialize { source: serde_json::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to bind the metrics listener.
    #[snafu(display("Failed to bind metrics endpoint on {addr}"))]
    MetricsBind {
        source: std::io::Error,
        addr: std::net::SocketAddr,
    },
}

// ============ Loader Error (top-level) ============

/// Top-level errors that end a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoaderError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Input file could not be loaded.
    #[snafu(display("Reader error"))]
    Reader { source: ReaderError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Payload self-check failed.
    #[snafu(display("Self-check failed"))]
    SelfCheck { source: SelfCheckError },

    /// Worker task panicked or was cancelled.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },
}

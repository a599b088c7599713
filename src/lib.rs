//! memc-load: loads gzip TSV app-install logs into sharded memcached.
//!
//! Each input file is read in full, parsed into device records, routed to
//! one of four shards by device type, aggregated last-write-wins by key and
//! written as protobuf payloads. Processed files are renamed with a leading
//! `.` so later runs skip them.
//!
//! # Example
//!
//! ```ignore
//! use memc_load::error::{ConfigSnafu, LoaderError};
//! use memc_load::{Config, run_loader};
//! use snafu::ResultExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LoaderError> {
//!     let config = Config::from_file("config.yaml").context(ConfigSnafu)?;
//!     let stats = run_loader(config).await?;
//!     println!("Wrote {} entries", stats.written);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod encode;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod router;
pub mod sink;
pub mod source;
pub mod store;

// Re-export main types
pub use config::Config;
pub use pipeline::{Loader, RunStats, run_loader};
pub use router::ShardTarget;
pub use store::{KvStore, KvStoreRef};

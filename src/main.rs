//! memc-load: loads gzip TSV app-install logs into sharded memcached.

use clap::Parser;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use memc_load::config::{Config, WritePolicy};
use memc_load::encode;
use memc_load::error::{ConfigSnafu, LoaderError, SelfCheckSnafu};
use memc_load::router::ShardTarget;
use memc_load::run_loader;

/// Load app-install logs into memcached.
#[derive(Parser, Debug)]
#[command(name = "memc-load")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log what would be written instead of writing it.
    #[arg(long)]
    dry: bool,

    /// Encode and decode sample payloads, then exit.
    #[arg(short, long)]
    test: bool,

    /// Glob selecting input files.
    #[arg(long)]
    pattern: Option<String>,

    /// memcached address for idfa devices.
    #[arg(long)]
    idfa: Option<String>,

    /// memcached address for gaid devices.
    #[arg(long)]
    gaid: Option<String>,

    /// memcached address for adid devices.
    #[arg(long)]
    adid: Option<String>,

    /// memcached address for dvid devices.
    #[arg(long)]
    dvid: Option<String>,

    /// Files processed at once (0 = all).
    #[arg(long)]
    max_concurrent_files: Option<usize>,

    /// What to do with the rest of a file after a failed write.
    #[arg(long, value_enum)]
    write_policy: Option<WritePolicy>,

    /// Append per-file outcomes as NDJSON to this file.
    #[arg(long)]
    manifest: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to debug for dry runs.
    #[arg(long)]
    log_level: Option<String>,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), LoaderError> {
    let args = Args::parse();

    if args.test {
        let _guard = init_logging(&args, &log_level(&args, args.dry));
        let checked = encode::self_check().context(SelfCheckSnafu)?;
        info!("Self-check passed for {} payloads", checked);
        return Ok(());
    }

    let config = build_config(&args)?;
    let _guard = init_logging(&args, &log_level(&args, config.write.dry_run));
    info!("memc-load started with pattern {}", config.source.pattern);

    run_loader(config).await?;
    Ok(())
}

/// `--log-level` if given, otherwise debug for dry runs and info for loads.
fn log_level(args: &Args, dry_run: bool) -> String {
    args.log_level
        .clone()
        .unwrap_or_else(|| if dry_run { "debug" } else { "info" }.to_string())
}

/// Set up the global subscriber. `RUST_LOG` wins over `level`.
fn init_logging(args: &Args, level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(log) = &args.log else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        return None;
    };

    let dir = log
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file = log.file_name().unwrap_or(log.as_os_str());
    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Some(guard)
}

/// Defaults, then the config file, then command-line flags.
fn build_config(args: &Args) -> Result<Config, LoaderError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu)?,
        None => Config::default(),
    };

    if args.dry {
        config.write.dry_run = true;
    }
    if let Some(pattern) = &args.pattern {
        config.source.pattern = pattern.clone();
    }
    if let Some(n) = args.max_concurrent_files {
        config.source.max_concurrent_files = n;
    }
    if let Some(policy) = args.write_policy {
        config.write.policy = policy;
    }
    if let Some(path) = &args.manifest {
        config.manifest.path = Some(path.clone());
    }

    let overrides = [
        (ShardTarget::Idfa, &args.idfa),
        (ShardTarget::Gaid, &args.gaid),
        (ShardTarget::Adid, &args.adid),
        (ShardTarget::Dvid, &args.dvid),
    ];
    for (shard, addr) in overrides {
        if let Some(addr) = addr {
            *config.shards.address_mut(shard) = addr.clone();
        }
    }

    config.validate().context(ConfigSnafu)?;
    Ok(config)
}

//! kiln cache server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use kiln_server::config::parse_size;
use kiln_server::{Config, Server, logging, signal};

#[derive(Parser)]
#[command(name = "kiln", version)]
#[command(about = "Memcached-compatible bounded LRU cache server")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Hard byte ceiling for the cache (accepts sizes like "256MB")
    #[arg(long)]
    max_bytes: Option<String>,

    /// Eviction target watermark; 0 selects 95% of the ceiling
    #[arg(long)]
    target_bytes: Option<String>,

    /// Maximum evictions per write operation
    #[arg(long)]
    evict_max: Option<usize>,

    /// Sliding TTL in seconds for successful incr/decr; 0 disables
    #[arg(long)]
    incr_sliding_ttl_seconds: Option<i64>,

    /// Per-item bookkeeping charge in bytes
    #[arg(long)]
    entry_overhead: Option<i64>,

    /// Worker threads (default: number of CPUs)
    #[arg(long)]
    threads: Option<usize>,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    logging::init(config.verbose);
    let shutdown = signal::install_signal_handler();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to build runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = Server::new(config);
    match runtime.block_on(server.serve(shutdown)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Layer flag overrides on top of the config file (or defaults).
fn build_config(args: &Args) -> Result<Config, String> {
    let mut config = match &args.config {
        Some(path) => {
            Config::load(path).map_err(|e| format!("failed to load config: {e}"))?
        }
        None => Config::default(),
    };

    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(max_bytes) = &args.max_bytes {
        config.max_bytes =
            parse_size(max_bytes).map_err(|e| format!("invalid --max-bytes: {e}"))?;
    }
    if let Some(target_bytes) = &args.target_bytes {
        config.target_bytes =
            parse_size(target_bytes).map_err(|e| format!("invalid --target-bytes: {e}"))?;
    }
    if let Some(evict_max) = args.evict_max {
        config.max_evict_per_op = evict_max;
    }
    if let Some(ttl) = args.incr_sliding_ttl_seconds {
        config.incr_sliding_ttl_seconds = ttl;
    }
    if let Some(entry_overhead) = args.entry_overhead {
        config.entry_overhead = entry_overhead;
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads);
    }
    if args.verbose {
        config.verbose = true;
    }

    Ok(config)
}

//! Robust DNS - CLI Entry Point
//!
//! Resolves one or more hostnames through a racing resolver set, printing
//! one line (or one JSON object) per result.

// Use mimalloc as global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use robust_dns::dns::RecordView;
use robust_dns::{RaceMode, Resolver, ResolverBuilder, ResolverConfig, VERSION};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "robust-dns")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "Resolve hostnames by racing several DNS servers")]
struct Args {
    /// Hostnames to resolve
    #[arg(required = true)]
    hostnames: Vec<String>,

    /// Path to configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Failover DNS server (repeatable, overrides config)
    #[arg(short = 'd', long = "dns")]
    dns: Vec<String>,

    /// Per-server timeout in milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Enable the TTL cache
    #[arg(long = "cache")]
    cache: bool,

    /// Cache TTL in milliseconds
    #[arg(long = "cache-ttl-ms")]
    cache_ttl_ms: Option<u64>,

    /// Serve stale entries while refreshing in the background
    #[arg(long = "refresh-on-expire")]
    refresh_on_expire: bool,

    /// Try servers in list order instead of racing them
    #[arg(long = "sequential")]
    sequential: bool,

    /// Resolve every hostname this many times
    #[arg(short = 'n', long = "repeat", default_value_t = 1)]
    repeat: u32,

    /// Print results (and logs) as JSON
    #[arg(long = "json")]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .enable_all()
        .thread_name("robust-dns-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("robust_dns=info".parse()?);
    if args.json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("Robust DNS v{}", VERSION);

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match ResolverConfig::load_async(path).await {
                Ok(c) => c,
                Err(e) => {
                    error!("Failed to load configuration: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => ResolverConfig::default(),
    };

    let resolver = match apply_overrides(ResolverBuilder::from_config(config), &args).build() {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to build resolver: {}", e);
            std::process::exit(1);
        }
    };

    for round in 0..args.repeat.max(1) {
        if round > 0 {
            info!(round, cached = resolver.cache_size(), "repeating");
        }
        resolve_all(&resolver, &args.hostnames, args.json).await?;
    }

    Ok(())
}

/// Apply CLI overrides on top of the loaded configuration
fn apply_overrides(mut builder: ResolverBuilder, args: &Args) -> ResolverBuilder {
    if !args.dns.is_empty() {
        builder = builder.failover_dns(args.dns.iter().cloned());
    }
    if let Some(ms) = args.timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    if args.cache {
        builder = builder.cache(true);
    }
    if let Some(ms) = args.cache_ttl_ms {
        builder = builder.cache_ttl(Duration::from_millis(ms));
    }
    if args.refresh_on_expire {
        builder = builder.refresh_on_expire(true);
    }
    if args.sequential {
        builder = builder.race_mode(RaceMode::Sequential);
    }
    builder
}

async fn resolve_all(resolver: &Resolver, hostnames: &[String], json: bool) -> anyhow::Result<()> {
    let lookups = hostnames.iter().map(|host| async move {
        let start = Instant::now();
        (host, resolver.resolve(host).await, start.elapsed())
    });

    for (host, result, elapsed) in futures::future::join_all(lookups).await {
        match result {
            Ok(record) if json => {
                let view = RecordView::new(host, &record, Instant::now());
                println!("{}", serde_json::to_string(&view)?);
            }
            Ok(record) => println!("{}\t{}\t{}ms", host, record, elapsed.as_millis()),
            Err(e) => error!(hostname = %host, "{}", e),
        }
    }
    Ok(())
}

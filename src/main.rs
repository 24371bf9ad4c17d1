//! grid-sync command line: synchronize one account and print an attribute
//! histogram of its metadata store.

use anyhow::{Context, Result};
use clap::Parser;
use grid_sync::{Config, GridSync, PageTokenResolver};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grid-sync")]
#[command(about = "Fetch and cache the photo metadata and images of a grid account")]
struct Args {
    /// Subdomain of the account to synchronize
    #[arg(long, default_value = "slowed")]
    subdomain: String,

    /// Attribute whose value frequencies are printed
    #[arg(long, default_value = "preset")]
    hist: String,

    /// Download metadata and then cache every image
    #[arg(long)]
    auto_cache: bool,

    /// Numeric owner id, skipping the grid page lookup
    #[arg(long)]
    owner_id: Option<u64>,

    /// Maximum number of metadata pages to fetch
    #[arg(long)]
    page_limit: Option<u64>,

    /// Width requested when caching images
    #[arg(long)]
    width: Option<u32>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if args.page_limit.is_some() {
        config.metadata.page_limit = args.page_limit;
    }
    if let Some(width) = args.width {
        config.images.cache_width = width;
    }

    let resolver = PageTokenResolver::from_config(&config.http);
    let sync = GridSync::connect(config, &args.subdomain, args.owner_id, &resolver)
        .await
        .with_context(|| format!("connecting to {}", args.subdomain))?;

    if args.auto_cache {
        let (metadata, report) = sync.sync_all().await?;
        info!(
            entries = metadata.store.len(),
            cached = report.cached,
            skipped = report.skipped,
            failed = report.failed,
            "sync complete"
        );
    } else if sync.load_store().await.is_empty() {
        let metadata = sync.download_metadata().await?;
        info!(entries = metadata.store.len(), "metadata downloaded");
    }

    let histogram = sync.attribute_frequency(&args.hist, false, false).await;
    println!("{} frequencies for {}:", args.hist, args.subdomain);
    for (value, count) in histogram {
        println!("{count:>8}  {value}");
    }

    Ok(())
}
